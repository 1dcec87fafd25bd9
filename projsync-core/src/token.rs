//! Role token equality and renewal planning.
//!
//! Both functions are pure: they take the observed tokens and the instant
//! "now" of the current pass and never touch the remote system.

use std::collections::BTreeMap;

use chrono::{DateTime, TimeDelta, Utc};
use tracing::debug;

use crate::error::{Error, Result};
use crate::time::{parse_duration, whole_seconds, DurationField};
use crate::transport::ProjectTokenCreateRequest;
use crate::types::{ObservedToken, ProjectRole, TokenSpec};

/// Identifies a token across all roles of a project.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenKey {
    pub role: String,
    pub id: String,
}

impl TokenKey {
    pub fn new(role: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            id: id.into(),
        }
    }
}

impl std::fmt::Display for TokenKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.role, self.id)
    }
}

/// Why a token has to be (re)issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueReason {
    Missing,
    Expired,
    RenewBefore,
    RenewAfter,
}

impl IssueReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            IssueReason::Missing => "missing",
            IssueReason::Expired => "expired",
            IssueReason::RenewBefore => "renew before expiry",
            IssueReason::RenewAfter => "renew after issuance",
        }
    }
}

/// Token-create requests a pass has to issue, ordered by role then token.
pub type TokenPlan = BTreeMap<TokenKey, ProjectTokenCreateRequest>;

/// A token spec with its durations parsed.
struct ParsedSpec<'a> {
    spec: &'a TokenSpec,
    expires_in: Option<TimeDelta>,
    renew_before: Option<TimeDelta>,
    renew_after: Option<TimeDelta>,
}

impl<'a> ParsedSpec<'a> {
    fn parse(spec: &'a TokenSpec) -> Result<Self> {
        let parse = |field, value: &Option<String>| {
            value
                .as_deref()
                .map(|v| parse_duration(field, v))
                .transpose()
        };
        Ok(Self {
            spec,
            expires_in: parse(DurationField::ExpiresIn, &spec.expires_in)?,
            renew_before: parse(DurationField::RenewBefore, &spec.renew_before)?,
            renew_after: parse(DurationField::RenewAfter, &spec.renew_after)?,
        })
    }

    /// Whether the observed token has exactly the lifetime this spec asks for.
    fn lifetime_matches(&self, observed: &ObservedToken) -> bool {
        match (self.expires_in, observed.lifetime()) {
            (None, None) => true,
            (Some(want), Some(have)) => want.num_seconds() == have.num_seconds(),
            _ => false,
        }
    }

    /// A live token is only reissued by its renewal policies. A lifetime
    /// that no longer matches `expires_in` is reported as drift but left
    /// alone here.
    fn issue_reason(
        &self,
        observed: Option<&ObservedToken>,
        now: DateTime<Utc>,
    ) -> Result<Option<IssueReason>> {
        let Some(token) = observed else {
            return Ok(Some(IssueReason::Missing));
        };
        if token.is_expired(now) {
            return Ok(Some(IssueReason::Expired));
        }
        if let (Some(before), Some(expires_at)) = (self.renew_before, token.expires_at) {
            let due = expires_at
                .checked_sub_signed(before)
                .ok_or_else(|| self.out_of_range(DurationField::RenewBefore))?;
            if now >= due {
                return Ok(Some(IssueReason::RenewBefore));
            }
        }
        if let Some(after) = self.renew_after {
            let due = token
                .issued_at
                .checked_add_signed(after)
                .ok_or_else(|| self.out_of_range(DurationField::RenewAfter))?;
            if now >= due {
                return Ok(Some(IssueReason::RenewAfter));
            }
        }
        Ok(None)
    }

    fn out_of_range(&self, field: DurationField) -> Error {
        let value = match field {
            DurationField::ExpiresIn => &self.spec.expires_in,
            DurationField::RenewBefore => &self.spec.renew_before,
            DurationField::RenewAfter => &self.spec.renew_after,
        };
        Error::DurationOutOfRange {
            field,
            value: value.clone().unwrap_or_default(),
        }
    }

    fn request(&self, project: &str, role: &str) -> ProjectTokenCreateRequest {
        ProjectTokenCreateRequest {
            project: project.to_string(),
            role: role.to_string(),
            id: self.spec.id.clone(),
            expires_in: self.expires_in.map(whole_seconds).unwrap_or(0),
            description: self.spec.description.clone(),
        }
    }
}

/// Check whether the observed tokens of a role satisfy the desired ones.
///
/// Tokens are paired by position. Each pair must share the ID, the observed
/// lifetime must equal `expires_in`, and the observed token must still be
/// valid at `now`. Sequences of different length are never equal.
pub fn is_equal_tokens(
    desired: &[TokenSpec],
    observed: &[ObservedToken],
    now: DateTime<Utc>,
) -> Result<bool> {
    if desired.len() != observed.len() {
        return Ok(false);
    }
    for (spec, token) in desired.iter().zip(observed) {
        let parsed = ParsedSpec::parse(spec)?;
        if spec.id != token.id || !parsed.lifetime_matches(token) || token.is_expired(now) {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Compute the token-create requests needed to bring the observed tokens in
/// line with the desired roles.
///
/// A token is issued when it is missing (including every token of a role
/// absent from `existing`), expired, or when one of its renewal policies is
/// due:
///
/// - `renew_before`: `now >= expires_at - renew_before`
/// - `renew_after`: `now >= issued_at + renew_after`
///
/// A policy whose due instant falls outside the representable date range
/// fails with [`Error::DurationOutOfRange`]. Tokens are evaluated
/// independently. The result holds only tokens that need action and is
/// empty when none do.
pub fn plan_token_requests(
    project: &str,
    roles: &[ProjectRole],
    existing: &BTreeMap<String, Vec<ObservedToken>>,
    now: DateTime<Utc>,
) -> Result<TokenPlan> {
    let mut plan = TokenPlan::new();

    for role in roles {
        let observed = existing.get(&role.name).map(Vec::as_slice).unwrap_or_default();

        for spec in &role.tokens {
            let parsed = ParsedSpec::parse(spec)?;
            let current = observed.iter().find(|t| t.id == spec.id);

            if let Some(reason) = parsed.issue_reason(current, now)? {
                debug!(
                    project = %project,
                    role = %role.name,
                    token = %spec.id,
                    reason = reason.as_str(),
                    "Token needs to be issued"
                );
                plan.insert(
                    TokenKey::new(&role.name, &spec.id),
                    parsed.request(project, &role.name),
                );
            }
        }
    }

    Ok(plan)
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOW: i64 = 1_700_000_000;

    fn now() -> DateTime<Utc> {
        at(NOW)
    }

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(secs, 0).unwrap()
    }

    fn spec(id: &str, expires_in: &str) -> TokenSpec {
        TokenSpec {
            id: id.to_string(),
            expires_in: Some(expires_in.to_string()),
            ..Default::default()
        }
    }

    fn observed(id: &str, issued: i64, expires: i64) -> ObservedToken {
        ObservedToken {
            id: id.to_string(),
            issued_at: at(NOW + issued),
            expires_at: Some(at(NOW + expires)),
        }
    }

    fn role(name: &str, tokens: Vec<TokenSpec>) -> ProjectRole {
        ProjectRole {
            name: name.to_string(),
            tokens,
            ..Default::default()
        }
    }

    fn existing(role: &str, tokens: Vec<ObservedToken>) -> BTreeMap<String, Vec<ObservedToken>> {
        BTreeMap::from([(role.to_string(), tokens)])
    }

    fn request(id: &str, expires_in: i64) -> ProjectTokenCreateRequest {
        ProjectTokenCreateRequest {
            project: "test-project".to_string(),
            role: "role1".to_string(),
            id: id.to_string(),
            expires_in,
            description: None,
        }
    }

    #[test]
    fn test_token_key_display() {
        assert_eq!(TokenKey::new("role1", "token1").to_string(), "role1.token1");
    }

    #[test]
    fn test_is_equal_tokens() {
        let cases = [
            (
                "equal",
                vec![spec("token1", "1h")],
                vec![observed("token1", 0, 3600)],
                true,
            ),
            (
                "different ids",
                vec![spec("token1", "1h")],
                vec![observed("token2", 0, 3600)],
                false,
            ),
            (
                "different expiration",
                vec![spec("token1", "2h")],
                vec![observed("token1", 0, 3600)],
                false,
            ),
            (
                "expired",
                vec![spec("token1", "1h")],
                vec![observed("token1", -7200, -3600)],
                false,
            ),
            (
                "expires now",
                vec![spec("token1", "1h")],
                vec![observed("token1", -3600, 0)],
                false,
            ),
            (
                "different lengths",
                vec![spec("token1", "1h")],
                vec![observed("token1", 0, 3600), observed("token2", 0, 7200)],
                false,
            ),
            ("both empty", vec![], vec![], true),
            (
                "paired by position",
                vec![spec("token1", "1h"), spec("token2", "1h")],
                vec![observed("token2", 0, 3600), observed("token1", 0, 3600)],
                false,
            ),
        ];

        for (name, desired, observed, want) in cases {
            let got = is_equal_tokens(&desired, &observed, now()).unwrap();
            assert_eq!(got, want, "case {}", name);
        }
    }

    #[test]
    fn test_is_equal_tokens_without_expiry() {
        let desired = vec![TokenSpec {
            id: "token1".to_string(),
            ..Default::default()
        }];
        let forever = ObservedToken {
            id: "token1".to_string(),
            issued_at: at(NOW - 86_400),
            expires_at: None,
        };
        assert!(is_equal_tokens(&desired, &[forever], now()).unwrap());
        assert!(!is_equal_tokens(&desired, &[observed("token1", 0, 3600)], now()).unwrap());
    }

    #[test]
    fn test_is_equal_tokens_length_checked_before_parsing() {
        let desired = vec![spec("token1", "whenever")];
        assert!(!is_equal_tokens(&desired, &[], now()).unwrap());
        assert!(matches!(
            is_equal_tokens(&desired, &[observed("token1", 0, 3600)], now()),
            Err(Error::Parse { .. })
        ));
    }

    #[test]
    fn test_plan_no_existing_tokens() {
        let roles = vec![role(
            "role1",
            vec![TokenSpec {
                description: Some("Test token".to_string()),
                ..spec("token1", "1h")
            }],
        )];

        let plan = plan_token_requests("test-project", &roles, &BTreeMap::new(), now()).unwrap();

        let want = TokenPlan::from([(
            TokenKey::new("role1", "token1"),
            ProjectTokenCreateRequest {
                description: Some("Test token".to_string()),
                ..request("token1", 3600)
            },
        )]);
        assert_eq!(plan, want);
    }

    #[test]
    fn test_plan() {
        let renew_before = |id: &str| TokenSpec {
            renew_before: Some("30m".to_string()),
            ..spec(id, "1h")
        };
        let renew_after = |id: &str| TokenSpec {
            renew_after: Some("30m".to_string()),
            ..spec(id, "1h")
        };

        type Case = (
            &'static str,
            Vec<TokenSpec>,
            Vec<ObservedToken>,
            Vec<ProjectTokenCreateRequest>,
        );
        let cases: Vec<Case> = vec![
            (
                "existing token ok",
                vec![spec("token1", "1h")],
                vec![observed("token1", -100, 3500)],
                vec![],
            ),
            (
                "no policy close to expiry",
                vec![spec("token1", "1h")],
                vec![observed("token1", -3599, 1)],
                vec![],
            ),
            (
                "renew before due",
                vec![renew_before("token1")],
                vec![observed("token1", -3000, 600)],
                vec![request("token1", 3600)],
            ),
            (
                "renew before boundary",
                vec![renew_before("token1")],
                vec![observed("token1", -1800, 1800)],
                vec![request("token1", 3600)],
            ),
            (
                "renew before not yet due",
                vec![renew_before("token1")],
                vec![observed("token1", -1799, 1801)],
                vec![],
            ),
            (
                "renew after due",
                vec![renew_after("token1")],
                vec![observed("token1", -3000, 600)],
                vec![request("token1", 3600)],
            ),
            (
                "renew after not yet due",
                vec![renew_after("token1")],
                vec![observed("token1", -100, 3500)],
                vec![],
            ),
            (
                "multiple tokens one needs renewal",
                vec![renew_before("token1"), renew_before("token2")],
                vec![observed("token1", -3000, 600), observed("token2", -100, 3500)],
                vec![request("token1", 3600)],
            ),
            (
                "one of two missing",
                vec![spec("token1", "1h"), spec("token2", "2h")],
                vec![observed("token1", -100, 3500)],
                vec![request("token2", 7200)],
            ),
            (
                "expired",
                vec![spec("token1", "1h")],
                vec![observed("token1", -7200, -3600)],
                vec![request("token1", 3600)],
            ),
            (
                "lifetime changed without policy",
                vec![spec("token1", "2h")],
                vec![observed("token1", -100, 3500)],
                vec![],
            ),
            (
                "lifetime changed renew before not yet due",
                vec![TokenSpec {
                    renew_before: Some("30m".to_string()),
                    ..spec("token1", "2h")
                }],
                vec![observed("token1", -100, 3500)],
                vec![],
            ),
        ];

        for (name, specs, tokens, want) in cases {
            let roles = vec![role("role1", specs)];
            let existing = existing("role1", tokens);
            let plan = plan_token_requests("test-project", &roles, &existing, now()).unwrap();
            let want: TokenPlan = want
                .into_iter()
                .map(|r| (TokenKey::new("role1", r.id.clone()), r))
                .collect();
            assert_eq!(plan, want, "case {}", name);
        }
    }

    #[test]
    fn test_plan_never_expiring_token() {
        let roles = vec![role(
            "role1",
            vec![TokenSpec {
                id: "token1".to_string(),
                renew_before: Some("30m".to_string()),
                ..Default::default()
            }],
        )];

        let missing = plan_token_requests("test-project", &roles, &BTreeMap::new(), now()).unwrap();
        assert_eq!(missing[&TokenKey::new("role1", "token1")].expires_in, 0);

        let forever = ObservedToken {
            id: "token1".to_string(),
            issued_at: at(NOW - 86_400),
            expires_at: None,
        };
        let plan =
            plan_token_requests("test-project", &roles, &existing("role1", vec![forever]), now())
                .unwrap();
        assert!(plan.is_empty());
    }

    #[test]
    fn test_plan_keys_tokens_per_role() {
        let roles = vec![
            role("ci", vec![spec("deploy", "1h")]),
            role("ops", vec![spec("deploy", "1h")]),
        ];
        let existing = existing("ci", vec![observed("deploy", -100, 3500)]);

        let plan = plan_token_requests("test-project", &roles, &existing, now()).unwrap();

        let keys: Vec<String> = plan.keys().map(ToString::to_string).collect();
        assert_eq!(keys, vec!["ops.deploy"]);
        assert_eq!(plan[&TokenKey::new("ops", "deploy")].role, "ops");
    }

    #[test]
    fn test_plan_is_idempotent() {
        let roles = vec![role(
            "role1",
            vec![
                TokenSpec {
                    renew_before: Some("30m".to_string()),
                    ..spec("token1", "1h")
                },
                spec("token2", "1h"),
            ],
        )];
        let existing = existing("role1", vec![observed("token1", -3000, 600)]);
        let snapshot = existing.clone();

        let first = plan_token_requests("test-project", &roles, &existing, now()).unwrap();
        let second = plan_token_requests("test-project", &roles, &existing, now()).unwrap();

        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
        assert_eq!(existing, snapshot);
    }

    #[test]
    fn test_plan_rejects_malformed_duration() {
        let roles = vec![role(
            "role1",
            vec![TokenSpec {
                renew_after: Some("eventually".to_string()),
                ..spec("token1", "1h")
            }],
        )];
        let existing = existing("role1", vec![observed("token1", -100, 3500)]);

        match plan_token_requests("test-project", &roles, &existing, now()) {
            Err(Error::Parse { field, value, .. }) => {
                assert_eq!(field, DurationField::RenewAfter);
                assert_eq!(value, "eventually");
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }

    #[test]
    fn test_plan_rejects_policy_beyond_date_range() {
        let cases = [
            (DurationField::RenewBefore, "renew before"),
            (DurationField::RenewAfter, "renew after"),
        ];

        for (field, name) in cases {
            let huge = Some("300000years".to_string());
            let token = match field {
                DurationField::RenewBefore => TokenSpec {
                    renew_before: huge,
                    ..spec("token1", "1h")
                },
                _ => TokenSpec {
                    renew_after: huge,
                    ..spec("token1", "1h")
                },
            };
            let roles = vec![role("role1", vec![token])];
            let existing = existing("role1", vec![observed("token1", -100, 3500)]);

            match plan_token_requests("test-project", &roles, &existing, now()) {
                Err(Error::DurationOutOfRange { field: got, value }) => {
                    assert_eq!(got, field, "case {}", name);
                    assert_eq!(value, "300000years", "case {}", name);
                }
                other => panic!("case {}: expected out of range, got {:?}", name, other),
            }
        }
    }
}
