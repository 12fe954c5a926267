//! Session cookie extraction from `Set-Cookie` header values.
//!
//! HTTP clients differ in how they surface multiple `Set-Cookie` headers:
//! some return one value per header, some fold them into a single
//! comma-separated string. Both shapes are accepted here by splitting every
//! value on `;` and `,` and scanning the pieces for `name=value`.
//!
//! A cookie value cannot contain `;` or `,` (RFC 6265 excludes them from
//! `cookie-value`), so the split never cuts a well-formed value. A
//! non-conforming value containing either delimiter is truncated at it.
//! Splitting on `,` also breaks `Expires=Wed, 21 Oct ...` attributes apart,
//! which is harmless because attribute pieces never start with the cookie
//! name.

/// Name of the iconfont.cn session cookie.
pub const SESSION_COOKIE_NAME: &str = "EGG_SESS_ICONFONT";

/// Finds a non-empty value for cookie `name` in `header_values`.
///
/// Surrounding double quotes are stripped. Returns the first match.
pub fn extract_cookie<'a, I>(header_values: I, name: &str) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    header_values
        .into_iter()
        .flat_map(|value| value.split([';', ',']))
        .filter_map(|piece| {
            let (key, value) = piece.trim().split_once('=')?;
            (key.trim() == name).then(|| value.trim().trim_matches('"'))
        })
        .find(|value| !value.is_empty())
        .map(str::to_string)
}

/// Finds the iconfont.cn session cookie in `header_values`.
pub fn extract_session_cookie<'a, I>(header_values: I) -> Option<String>
where
    I: IntoIterator<Item = &'a str>,
{
    extract_cookie(header_values, SESSION_COOKIE_NAME)
}

/// Builds the `Cookie` request header value for `token`.
#[must_use]
pub fn cookie_header(token: &str) -> String {
    format!("{SESSION_COOKIE_NAME}={token}")
}
