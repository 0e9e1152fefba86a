//! Identifier types
//!
//! - ObjectId: opaque byte string naming a target within one adapter
//! - AdapterPath: names of the adapters from the root down to a target adapter
//! - ServerId: identifies one runtime instance in routing keys
//! - AdapterId / ManagerId: process-local handles for adapters and managers

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bytes::{Buf, BufMut, Bytes, BytesMut};

/// Object identifier
///
/// Equality and hashing are by content. The backing buffer is shared, so
/// clones are cheap and never alias mutable storage.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct ObjectId(Bytes);

impl ObjectId {
    /// Size of a system-assigned id in bytes
    pub const SYSTEM_ID_SIZE: usize = 4;

    /// Create an id by copying the given bytes
    pub fn new(bytes: &[u8]) -> Self {
        Self(Bytes::copy_from_slice(bytes))
    }

    /// Create an id from a static byte string
    pub fn from_static(bytes: &'static [u8]) -> Self {
        Self(Bytes::from_static(bytes))
    }

    /// Encode a system-assigned counter value (big-endian)
    pub fn from_counter(value: u32) -> Self {
        let mut buf = BytesMut::with_capacity(Self::SYSTEM_ID_SIZE);
        buf.put_u32(value);
        Self(buf.freeze())
    }

    /// Decode a system-assigned counter value, if the id has that shape
    pub fn as_counter(&self) -> Option<u32> {
        if self.0.len() != Self::SYSTEM_ID_SIZE {
            return None;
        }
        let mut buf = self.0.clone();
        Some(buf.get_u32())
    }

    /// Raw bytes
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Backing buffer
    pub fn to_bytes(&self) -> Bytes {
        self.0.clone()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Bytes> for ObjectId {
    fn from(bytes: Bytes) -> Self {
        Self(bytes)
    }
}

impl From<Vec<u8>> for ObjectId {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Bytes::from(bytes))
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self::new(s.as_bytes())
    }
}

impl AsRef<[u8]> for ObjectId {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectId({})", self)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.0.iter() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

/// Path of an adapter below the root
///
/// The root adapter has the empty path.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct AdapterPath(Vec<String>);

impl AdapterPath {
    /// The root path
    pub fn root() -> Self {
        Self(Vec::new())
    }

    /// Build a path from its segments
    pub fn from_segments<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    /// Path of a child adapter
    pub fn child(&self, name: &str) -> Self {
        let mut segments = self.0.clone();
        segments.push(name.to_string());
        Self(segments)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Number of levels below the root
    pub fn depth(&self) -> usize {
        self.0.len()
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    /// Last segment, or the empty string for the root
    pub fn name(&self) -> &str {
        self.0.last().map(String::as_str).unwrap_or("")
    }
}

impl fmt::Debug for AdapterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AdapterPath({})", self)
    }
}

impl fmt::Display for AdapterPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.0 {
            write!(f, "/{}", segment)?;
        }
        Ok(())
    }
}

/// Server identifier embedded in routing keys
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ServerId(pub u32);

impl ServerId {
    /// Generate a transient server id for this runtime instance
    pub fn generate() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos() as u64;
        // Mix with process ID so two runtimes started together still differ
        let pid = std::process::id() as u64;
        let mixed = timestamp ^ (pid << 32) ^ next_local_id();
        Self((mixed ^ (mixed >> 32)) as u32)
    }
}

impl fmt::Debug for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ServerId({:08x})", self.0)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:08x}", self.0)
    }
}

static LOCAL_IDS: AtomicU64 = AtomicU64::new(1);

fn next_local_id() -> u64 {
    LOCAL_IDS.fetch_add(1, Ordering::Relaxed)
}

/// Process-local adapter handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct AdapterId(pub u64);

impl AdapterId {
    pub fn generate() -> Self {
        Self(next_local_id())
    }
}

/// Process-local adapter manager handle
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ManagerId(pub u64);

impl ManagerId {
    pub fn generate() -> Self {
        Self(next_local_id())
    }
}
