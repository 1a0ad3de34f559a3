use std::sync::LazyLock;

use parking_lot::Mutex;

/// Extension of a message file that is waiting for delivery
pub const PENDING_EXTENSION: &str = "msg";

/// Extension of a message file that a flush currently owns
pub const CLAIMED_EXTENSION: &str = "claimed";

static GENERATOR: LazyLock<Mutex<ulid::Generator>> =
    LazyLock::new(|| Mutex::new(ulid::Generator::new()));

/// Identifier for a spooled message
///
/// This is a ULID that serves as both the tracking ID and the filename stem
/// for spooled messages. IDs generated by one process are strictly
/// increasing, so sorting by ID gives enqueue order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId {
    id: ulid::Ulid,
}

impl MessageId {
    /// Parse a message ID from a filename like `01ARYZ6S41....msg` or
    /// `01ARYZ6S41....claimed`
    ///
    /// # Security
    /// This function explicitly rejects:
    /// - Path separators (/ and \)
    /// - Directory traversal patterns (..)
    /// - Invalid ULID format
    pub fn from_filename(filename: &str) -> Option<Self> {
        if filename.contains('/') || filename.contains('\\') || filename.contains("..") {
            return None;
        }

        let (stem, extension) = filename.rsplit_once('.')?;
        if extension != PENDING_EXTENSION && extension != CLAIMED_EXTENSION {
            return None;
        }

        let id = ulid::Ulid::from_string(stem).ok()?;

        Some(Self { id })
    }

    /// Generate a new unique message ID, greater than any previously
    /// generated in this process
    #[must_use]
    pub fn generate() -> Self {
        let id = GENERATOR
            .lock()
            .generate()
            .unwrap_or_else(|_| ulid::Ulid::new());

        Self { id }
    }

    /// Milliseconds since the Unix epoch at which this ID was generated
    #[must_use]
    pub const fn timestamp_ms(&self) -> u64 {
        self.id.timestamp_ms()
    }

    /// Filename of the message while it is pending
    #[must_use]
    pub fn pending_filename(&self) -> String {
        format!("{}.{PENDING_EXTENSION}", self.id)
    }

    /// Filename of the message while a flush owns it
    #[must_use]
    pub fn claimed_filename(&self) -> String {
        format!("{}.{CLAIMED_EXTENSION}", self.id)
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl serde::Serialize for MessageId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.id.to_string())
    }
}

impl<'de> serde::Deserialize<'de> for MessageId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        let id = ulid::Ulid::from_string(&s).map_err(serde::de::Error::custom)?;
        Ok(Self { id })
    }
}
