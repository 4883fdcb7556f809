use crate::runtime::contract::AccountRecord;

pub trait AccountStore {
    fn fetch_record(&self, account_name: &str) -> Result<AccountRecord, String>;

    /// Unconditional last-writer-wins update of `account_status` and
    /// `deletion_date`.
    fn mark_closed(&self, account_name: &str, deletion_date: &str) -> Result<(), String>;
}
