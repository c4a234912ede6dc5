//! Validation handshake (§4.1 "Handshake mode"). The platform probes a new
//! callback URL with a `validationToken` query parameter and expects it
//! echoed back, unmodified, as `text/plain` before it will deliver any real
//! notifications. There is no parsing or side effect here by design — the
//! whole point is to answer before any authenticated work starts.

/// Echoes `validation_token` back verbatim. Trivial, but kept as its own
/// function so the HTTP layer never has to guess what "handshake" means.
pub fn respond(validation_token: &str) -> String {
    validation_token.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn echoes_the_token_unmodified() {
        assert_eq!(respond("abc123=="), "abc123==");
    }
}
