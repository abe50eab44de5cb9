use std::collections::HashSet;
use std::fmt::{self, Display, Formatter};

/// Opaque watched-account identifier. The watched set is configured once
/// per run (spec.md §3).
#[derive(Clone, Eq, PartialEq, Ord, PartialOrd, Hash, Debug, serde::Deserialize, serde::Serialize)]
pub struct AccountId(pub String);

impl From<String> for AccountId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for AccountId {
    fn from(value: &str) -> Self {
        Self(value.to_owned())
    }
}

impl Display for AccountId {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The configured set of accounts to watch. Membership is checked on
/// every extracted account before a normalised event is emitted.
#[derive(Clone, Debug)]
pub struct WatchedAccounts(HashSet<AccountId>);

impl WatchedAccounts {
    pub fn new<I, S>(accounts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<AccountId>,
    {
        Self(accounts.into_iter().map(Into::into).collect())
    }

    pub fn contains(&self, account: &AccountId) -> bool {
        self.0.contains(account)
    }

    pub fn iter(&self) -> impl Iterator<Item = &AccountId> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_watched_accounts_contains() {
        struct TestCase {
            watched: Vec<&'static str>,
            query: AccountId,
            expected: bool,
        }

        let cases = vec![
            TestCase {
                watched: vec!["0xabc", "0xdef"],
                query: AccountId::from("0xabc"),
                expected: true,
            },
            TestCase {
                watched: vec!["0xabc", "0xdef"],
                query: AccountId::from("0x123"),
                expected: false,
            },
        ];

        for (index, test) in cases.into_iter().enumerate() {
            let watched = WatchedAccounts::new(test.watched);
            assert_eq!(
                watched.contains(&test.query),
                test.expected,
                "TC{index} failed"
            );
        }
    }
}
