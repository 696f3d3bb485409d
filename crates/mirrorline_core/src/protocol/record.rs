//! Entity kinds that can cross the wire.

use super::serialization::{WireReader, WireWriter};
use crate::ecs::TypeTag;

/// An entity kind with a stable name and an explicit field-by-field encoding.
///
/// Implementors write every field in a fixed order with the
/// [`WireWriter`] primitives and read them back in the same order.
///
/// # Example
///
/// ```rust
/// use mirrorline_core::{Replicated, WireReader, WireWriter};
///
/// #[derive(Clone, Debug, PartialEq)]
/// struct Marker {
///     height: f32,
/// }
///
/// impl Replicated for Marker {
///     const KIND: &'static str = "demo.Marker";
///
///     fn encode(&self, writer: &mut WireWriter) {
///         writer.write_f32(self.height);
///     }
///
///     fn decode(reader: &mut WireReader<'_>) -> Option<Self> {
///         Some(Self { height: reader.read_f32()? })
///     }
/// }
///
/// let mut writer = WireWriter::new();
/// Marker { height: 2.0 }.encode(&mut writer);
/// let mut reader = WireReader::new(writer.as_slice());
/// assert_eq!(Marker::decode(&mut reader), Some(Marker { height: 2.0 }));
/// ```
pub trait Replicated: Clone + Send + 'static {
    /// Canonical kind name, identical on every peer.
    const KIND: &'static str;

    /// Wire tag derived from [`Replicated::KIND`].
    const TAG: TypeTag = TypeTag::of_name(Self::KIND);

    /// Appends the value's fields to `writer`.
    fn encode(&self, writer: &mut WireWriter);

    /// Reads one value, or `None` if the bytes run out or are invalid.
    fn decode(reader: &mut WireReader<'_>) -> Option<Self>;
}
