//! Lookup of site accounts by mail address.

use crate::result::Account;

pub trait AccountDirectory: Send + Sync {
    /// The account registered with `mail` (case-insensitive), if any.
    fn find_by_mail(&self, mail: &str) -> Option<Account>;
}

/// A fixed list of accounts.
#[derive(Debug, Clone, Default)]
pub struct MemoryAccountDirectory {
    accounts: Vec<Account>,
}

impl MemoryAccountDirectory {
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        Self {
            accounts: accounts.into_iter().collect(),
        }
    }
}

impl AccountDirectory for MemoryAccountDirectory {
    fn find_by_mail(&self, mail: &str) -> Option<Account> {
        self.accounts
            .iter()
            .find(|account| !account.mail.is_empty() && account.mail.eq_ignore_ascii_case(mail))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_by_mail() {
        let directory = MemoryAccountDirectory::new([
            Account::new(1, "admin", "admin@example.com"),
            Account::new(2, "user", "user@example.org"),
        ]);
        assert_eq!(
            directory.find_by_mail("USER@example.org").map(|a| a.id),
            Some(2)
        );
        assert!(directory.find_by_mail("other@example.org").is_none());
        assert!(directory.find_by_mail("").is_none());
    }
}
