//! `${VAR}` placeholder expansion for config values.
//!
//! Secrets stay out of `courier.toml`: the file carries placeholders like
//! `access_token = "${WHATSAPP_ACCESS_TOKEN}"` and the loader expands them
//! from the process environment after parsing. An unset variable leaves its
//! placeholder intact, so a missing secret fails loudly where the value is
//! used instead of becoming a silent empty string.

/// Expand `${NAME}` placeholders from the process environment.
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Expansion against an arbitrary lookup; keeps the tests off the real
/// environment.
fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;

    while let Some(start) = rest.find("${") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        let Some(end) = after.find('}') else {
            // Unterminated placeholder: keep the tail verbatim.
            out.push_str(&rest[start..]);
            return out;
        };

        let name = &after[..end];
        match (name.is_empty(), lookup(name)) {
            (false, Some(value)) => out.push_str(&value),
            _ => {
                out.push_str("${");
                out.push_str(name);
                out.push('}');
            },
        }
        rest = &after[end + 1..];
    }

    out.push_str(rest);
    out
}
