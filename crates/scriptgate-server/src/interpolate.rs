//! `%NAME%` environment expansion for configuration strings.

/// Expands `%NAME%` tokens from the process environment.
///
/// Unset variables expand to the empty string. A `%` with no closing `%`
/// drops itself and everything after it.
///
/// ```
/// use scriptgate_server::interpolate::interpolate;
///
/// assert_eq!(interpolate("%"), "");
/// assert_eq!(interpolate("plain\\path"), "plain\\path");
/// ```
pub fn interpolate(text: &str) -> String {
    interpolate_with(text, |name| std::env::var(name).ok())
}

/// Same scan as [`interpolate`] with a caller-supplied variable lookup.
pub fn interpolate_with<F>(text: &str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            result.push(c);
            continue;
        }

        let mut name = String::new();
        let mut closed = false;
        for inner in chars.by_ref() {
            if inner == '%' {
                closed = true;
                break;
            }
            name.push(inner);
        }

        if closed {
            if let Some(value) = lookup(&name) {
                result.push_str(&value);
            }
        }
    }

    result
}
