use serde::{Deserialize, Serialize};

/// Class of an issued bearer token. Tokens carry a class-indicating prefix
/// for human operators; policy always reads this column, never the prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenClass {
    HumanIssued,
    AgentIssued,
}

impl TokenClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenClass::HumanIssued => "humanIssued",
            TokenClass::AgentIssued => "agentIssued",
        }
    }
}

impl std::str::FromStr for TokenClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "humanIssued" => Ok(TokenClass::HumanIssued),
            "agentIssued" => Ok(TokenClass::AgentIssued),
            other => Err(format!("unknown token class {other:?}")),
        }
    }
}

/// One row of the token store: the sole source of authentication truth.
/// Created by external auth endpoints; the gateway only ever reads.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub class: TokenClass,
    pub principal: String,
    pub scopes: Vec<String>,
    /// Unix seconds. Expiry is passive; there is no revocation path.
    pub expires_at: i64,
    pub created_at: i64,
    pub analytics_ref: Option<String>,
}

impl TokenRecord {
    pub fn is_expired(&self, now_unix: i64) -> bool {
        self.expires_at <= now_unix
    }

    /// Scopes the operation requires that this token does not hold,
    /// in the operation's declared order.
    pub fn missing_scopes(&self, required: &[String]) -> Vec<String> {
        required
            .iter()
            .filter(|scope| !self.scopes.contains(scope))
            .cloned()
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn token(scopes: &[&str]) -> TokenRecord {
        TokenRecord {
            token: "pat_humans_abc123".to_string(),
            class: TokenClass::HumanIssued,
            principal: "patron:42".to_string(),
            scopes: scopes.iter().map(|s| s.to_string()).collect(),
            expires_at: 2_000,
            created_at: 1_000,
            analytics_ref: None,
        }
    }

    #[test]
    fn expiry_is_inclusive_of_the_deadline() {
        let t = token(&[]);
        assert!(!t.is_expired(1_999));
        assert!(t.is_expired(2_000));
        assert!(t.is_expired(2_001));
    }

    #[test]
    fn missing_scopes_preserve_declared_order() {
        let t = token(&["items:browse"]);
        let required = vec![
            "items:write".to_string(),
            "items:browse".to_string(),
            "reports:run".to_string(),
        ];
        assert_eq!(t.missing_scopes(&required), vec!["items:write", "reports:run"]);
        assert!(t.missing_scopes(&["items:browse".to_string()]).is_empty());
    }
}
