/// One object listed under a remote prefix.
///
/// `key` is the full object key as the store reports it; the sync engine
/// strips its own prefix to derive workspace-relative paths.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteObject {
    pub key: String,
    pub size: u64,
}
