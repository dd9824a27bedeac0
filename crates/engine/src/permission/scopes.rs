//! Bearer token scopes: `<permission-id>_<club-id>`, space separated.

use crate::{EngineError, ResultEngine};

/// Parse one `<permission>_<club>` scope.
pub fn parse_scope(scope: &str) -> ResultEngine<(i64, i64)> {
    let invalid = || {
        EngineError::validation(
            "scopes",
            "invalid_scope",
            format!("invalid scope {scope:?}, expected <permission>_<club>"),
        )
    };
    let (permission, club) = scope.split_once('_').ok_or_else(invalid)?;
    let permission = permission.parse::<i64>().map_err(|_| invalid())?;
    let club = club.parse::<i64>().map_err(|_| invalid())?;
    Ok((permission, club))
}

/// Parse a whitespace-separated scope list, dropping duplicates.
pub fn parse_scopes(scopes: &str) -> ResultEngine<Vec<(i64, i64)>> {
    let mut parsed: Vec<(i64, i64)> = Vec::new();
    for scope in scopes.split_whitespace() {
        let pair = parse_scope(scope)?;
        if !parsed.contains(&pair) {
            parsed.push(pair);
        }
    }
    Ok(parsed)
}

pub fn format_scopes(scopes: &[(i64, i64)]) -> String {
    scopes
        .iter()
        .map(|(permission, club)| format!("{permission}_{club}"))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scope_lists() {
        assert_eq!(
            parse_scopes(" 12_1  4_2 12_1").unwrap(),
            vec![(12, 1), (4, 2)]
        );
        assert!(parse_scopes("").unwrap().is_empty());
    }

    #[test]
    fn rejects_malformed_scopes() {
        for scope in ["12", "a_1", "1_b", "1_2_3", "_"] {
            assert!(parse_scope(scope).is_err(), "{scope}");
        }
    }

    #[test]
    fn formats_scopes() {
        assert_eq!(format_scopes(&[(12, 1), (4, 2)]), "12_1 4_2");
    }
}
