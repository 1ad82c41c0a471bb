use rand::Rng;
use regex::Regex;

/// Placeholder id meaning "no previous identity".
pub const EMPTY_REPLID: &str = "0000000000000000000000000000000000000000";

const REPLID_LENGTH: usize = 40;
const HEX_DIGITS: &[u8] = b"0123456789abcdef";

pub fn generate_replid() -> String {
    let mut rng = rand::thread_rng();

    (0..REPLID_LENGTH)
        .map(|_| HEX_DIGITS[rng.gen_range(0..HEX_DIGITS.len())] as char)
        .collect()
}

pub fn is_valid_repl_id(repl_id: &str) -> bool {
    Regex::new(r"^[a-zA-Z0-9]{40}$").is_ok_and(|re| re.is_match(repl_id))
}

/// The current replication id of a node and the one it had before.
///
/// A replica that followed the previous history can still resume partially
/// as long as it does not ask for anything past `second_offset`, the offset
/// at which that history ended.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplicationIdentity {
    pub replid: String,
    pub replid2: String,
    pub second_offset: i64,
}

impl Default for ReplicationIdentity {
    fn default() -> Self {
        Self::new()
    }
}

impl ReplicationIdentity {
    pub fn new() -> Self {
        Self {
            replid: generate_replid(),
            replid2: EMPTY_REPLID.to_string(),
            second_offset: -1,
        }
    }

    /// Starts a fresh history with no previous identity.
    pub fn rotate(&mut self) {
        self.replid = generate_replid();
        self.clear_previous();
    }

    /// Retires the current id at `offset` and continues under `new_replid`.
    pub fn shift(&mut self, new_replid: String, offset: i64) {
        self.replid2 = std::mem::replace(&mut self.replid, new_replid);
        self.second_offset = offset;
    }

    /// Takes over the identity of a master after a full resync.
    pub fn adopt(&mut self, replid: String) {
        self.replid = replid;
        self.clear_previous();
    }

    pub fn clear_previous(&mut self) {
        self.replid2 = EMPTY_REPLID.to_string();
        self.second_offset = -1;
    }

    /// Whether a replica at `(replid, offset)` shares this node's history.
    pub fn matches(&self, replid: &str, offset: i64) -> bool {
        replid == self.replid || (replid == self.replid2 && offset <= self.second_offset)
    }
}
