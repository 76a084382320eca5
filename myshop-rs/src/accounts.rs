//! Seller and customer accounts loaded from a TOML file.
//!
//! ## Accounts file format
//!
//! ```toml
//! [[sellers]]
//! id = "17"
//! email = "owner@example.com"
//! name = "Corner Bakery"
//! password = "secret"
//! role = "owner"
//! store_id = 4
//!
//! [[customers]]
//! id = "c-903"
//! email = "buyer@example.com"
//! name = "Sam Buyer"
//! password = "hunter2"
//! ```
//!
//! Emails are matched case-insensitively. Entries with an empty id, email or
//! password are skipped; duplicate emails keep the last entry. Seller ids key
//! onboarding records, so sellers whose id is not a plain identifier
//! (ASCII letters, digits, `-`, `_`) are skipped with a warning.
//!
//! **Security:** Use `chmod 600` on the accounts file. The server warns if it
//! is world-readable (Unix).

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::warn;

use crate::onboarding::is_storable_key;
use crate::session::SessionClaims;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
    #[serde(default)]
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub store_id: Option<u64>,
}

impl Account {
    pub fn claims(&self) -> SessionClaims {
        SessionClaims {
            sub: self.id.clone(),
            email: self.email.clone(),
            name: self.name.clone(),
            role: self.role.clone(),
            store_id: self.store_id,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AccountDirectory {
    sellers: BTreeMap<String, Account>,
    customers: BTreeMap<String, Account>,
}

impl AccountDirectory {
    pub fn new(sellers: Vec<Account>, customers: Vec<Account>) -> Self {
        Self {
            sellers: index_by_email(sellers, "seller", is_storable_key),
            customers: index_by_email(customers, "customer", |_| true),
        }
    }

    pub fn seller_count(&self) -> usize {
        self.sellers.len()
    }

    pub fn customer_count(&self) -> usize {
        self.customers.len()
    }

    pub fn authenticate_seller(&self, email: &str, password: &str) -> Option<&Account> {
        authenticate(&self.sellers, email, password)
    }

    pub fn authenticate_customer(&self, email: &str, password: &str) -> Option<&Account> {
        authenticate(&self.customers, email, password)
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

fn index_by_email(
    accounts: Vec<Account>,
    kind: &'static str,
    usable_id: fn(&str) -> bool,
) -> BTreeMap<String, Account> {
    let mut mapped = BTreeMap::new();

    for mut account in accounts {
        account.id = account.id.trim().to_string();
        account.email = normalize_email(&account.email);
        if account.id.is_empty() || account.email.is_empty() || account.password.is_empty() {
            continue;
        }
        if !usable_id(&account.id) {
            warn!(kind, id = %account.id, "skipping account with unsupported id");
            continue;
        }
        mapped.insert(account.email.clone(), account);
    }

    mapped
}

/// Compared against on an email miss so unknown accounts cost the same work.
const PLACEHOLDER_PASSWORD: &[u8] = b"myshop-placeholder-password";

fn authenticate<'a>(
    accounts: &'a BTreeMap<String, Account>,
    email: &str,
    password: &str,
) -> Option<&'a Account> {
    let Some(account) = accounts.get(&normalize_email(email)) else {
        std::hint::black_box(password.as_bytes().ct_eq(PLACEHOLDER_PASSWORD));
        return None;
    };
    bool::from(password.as_bytes().ct_eq(account.password.as_bytes())).then_some(account)
}

#[derive(Debug, Error)]
pub enum AccountsError {
    #[error("failed to read accounts file {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid accounts file {path}: {source}")]
    Parse {
        path: String,
        source: toml::de::Error,
    },
    #[error("accounts file {path} does not define any usable account")]
    Empty { path: String },
}

#[derive(Debug, Default, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    sellers: Vec<Account>,
    #[serde(default)]
    customers: Vec<Account>,
}

/// Load accounts from a file. Returns an empty directory if path is None.
pub fn load_accounts(path: Option<&Path>) -> Result<AccountDirectory, AccountsError> {
    let Some(path) = path else {
        return Ok(AccountDirectory::default());
    };
    check_accounts_file_permissions(path);

    let raw = std::fs::read_to_string(path).map_err(|source| AccountsError::Read {
        path: path.display().to_string(),
        source,
    })?;

    let parsed: AccountsFile = toml::from_str(&raw).map_err(|source| AccountsError::Parse {
        path: path.display().to_string(),
        source,
    })?;

    let directory = AccountDirectory::new(parsed.sellers, parsed.customers);
    if directory.seller_count() + directory.customer_count() == 0 {
        return Err(AccountsError::Empty {
            path: path.display().to_string(),
        });
    }
    Ok(directory)
}

#[cfg(unix)]
fn check_accounts_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    if let Ok(meta) = std::fs::metadata(path) {
        let mode = meta.permissions().mode();
        if mode & 0o004 != 0 {
            warn!(
                path = %path.display(),
                "accounts file is world-readable; consider chmod 600"
            );
        }
    }
}

#[cfg(not(unix))]
fn check_accounts_file_permissions(_path: &Path) {}
