/// A 32-byte BLAKE3 hash used as a content digest.
///
/// Specifications are fingerprinted with it, so two registrations of the same
/// converter script can be recognised without comparing their text.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct Hash32([u8; 32]);

impl<T> From<T> for Hash32
where
    T: Into<[u8; 32]>,
{
    fn from(value: T) -> Self {
        Hash32(value.into())
    }
}

impl Hash32 {
    pub fn hash(buffer: impl AsRef<[u8]>) -> Self {
        blake3::Hasher::new()
            .update(buffer.as_ref())
            .finalize()
            .into()
    }

    pub fn to_hex(self) -> String {
        const HEX: &[u8; 16] = b"0123456789abcdef";
        let mut acc = String::with_capacity(64);

        for &byte in &self.0 {
            acc.push(HEX[(byte >> 4) as usize] as char);
            acc.push(HEX[(byte & 0xF) as usize] as char);
        }

        acc
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash32({})", self.to_hex())
    }
}

impl std::fmt::Display for Hash32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

/// The context passed to every task execution.
///
/// It is created by the pipeline right before a task runs and is immutable
/// while the task runs.
pub struct TaskContext<'a> {
    /// Name of the running task.
    pub name: &'a str,
    /// Tracing span assigned to this task.
    pub(crate) span: tracing::Span,
}

impl<'a> TaskContext<'a> {
    pub(crate) fn new(name: &'a str) -> Self {
        Self {
            name,
            span: tracing::span!(tracing::Level::INFO, "task", name = %name),
        }
    }

    /// The span the task runs in, for tasks that want to attach their own
    /// events to it.
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }
}
