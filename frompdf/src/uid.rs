//! Generation of globally unique identifiers (UIDs).
use uuid::Uuid;

/// UID root for identifiers derived from a UUID,
/// as defined in ISO/IEC 9834-8.
pub const UUID_UID_ROOT: &str = "2.25";

/// The maximum length of a UID in characters.
pub const MAX_UID_LENGTH: usize = 64;

/// A source of fresh globally unique identifiers.
///
/// Any `Fn() -> String` closure is a generator,
/// which allows tests to inject a deterministic sequence.
pub trait UidGenerator {
    /// Produce a new UID, never returned before.
    fn generate_uid(&self) -> String;
}

impl<F> UidGenerator for F
where
    F: Fn() -> String,
{
    fn generate_uid(&self) -> String {
        self()
    }
}

/// The default UID generator,
/// which creates UIDs under the [`UUID_UID_ROOT`]
/// from random (version 4) UUIDs.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct RandomUid;

impl UidGenerator for RandomUid {
    fn generate_uid(&self) -> String {
        generate_uid()
    }
}

/// Generate a new UID from a random UUID.
pub fn generate_uid() -> String {
    format!("{}.{}", UUID_UID_ROOT, Uuid::new_v4().as_u128())
}

/// Check whether the given string is a well-formed UID:
/// at most 64 characters,
/// with dot separated numeric components
/// and no leading zeros in multi-digit components.
pub fn is_valid_uid(uid: &str) -> bool {
    !uid.is_empty()
        && uid.len() <= MAX_UID_LENGTH
        && uid.split('.').all(|component| {
            !component.is_empty()
                && component.bytes().all(|b| b.is_ascii_digit())
                && (component == "0" || !component.starts_with('0'))
        })
}
