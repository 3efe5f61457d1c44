//! Embedding of the PDF document and persistence of the DICOM file.
use crate::header;
use crate::payload::PdfInfo;
use dicom_core::header::Header;
use dicom_core::value::Value as DicomValue;
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids};
use dicom_encoding::{Codec, TransferSyntax, TransferSyntaxIndex};
use dicom_object::{FileMetaTableBuilder, InMemDicomObject};
use dicom_transfer_syntax_registry::TransferSyntaxRegistry;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::collections::TryReserveError;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// An error which may occur when embedding the document
/// or writing the DICOM file.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("unable to read file {}", path.display()))]
    OpenPayload {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("read error in file {}", path.display()))]
    ReadPayload {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Document of {len} bytes is too large to be encapsulated
    PayloadTooLarge { len: u64 },

    /// Could not allocate {len} bytes for the encapsulated document
    ResourceExhausted {
        len: usize,
        source: TryReserveError,
    },

    /// Could not insert the encapsulated document
    InsertDocument { source: header::Error },

    /// Unknown transfer syntax {uid}
    UnknownTransferSyntax { uid: String },

    /// No conversion to transfer syntax {name} possible: {reason}
    UnsupportedTransferSyntax { name: String, reason: String },

    /// No conversion to transfer syntax {name} possible
    EncodeDataSet {
        name: String,
        #[snafu(source(from(dicom_object::WriteError, Box::new)))]
        source: Box<dicom_object::WriteError>,
    },

    /// Invalid padding of {file_pad} bytes per file and {item_pad} bytes per item
    InvalidPadding { file_pad: u32, item_pad: u32 },

    /// Could not build the file meta group
    BuildMeta { source: dicom_object::WithMetaError },

    #[snafu(display("could not write file {}", path.display()))]
    Storage {
        path: PathBuf,
        #[snafu(source(from(dicom_object::WriteError, Box::new)))]
        source: Box<dicom_object::WriteError>,
    },
}

impl Error {
    /// Whether the data set could not be written
    /// in the requested transfer syntax.
    pub fn is_unsupported_transfer_syntax(&self) -> bool {
        matches!(
            self,
            Error::UnknownTransferSyntax { .. }
                | Error::UnsupportedTransferSyntax { .. }
                | Error::EncodeDataSet { .. }
        )
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Whether to keep group length attributes in the data set.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum GroupLength {
    /// Remove all group length attributes
    /// (the file meta group length is always written)
    #[default]
    Remove,
    /// Keep group length attributes as they are
    Keep,
}

/// Whether to pad the data set to a multiple of a number of bytes.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum Padding {
    /// No padding
    #[default]
    None,
    /// Append a _Data Set Trailing Padding_ attribute
    /// so that the data set length is a multiple of `file_pad` bytes.
    ///
    /// Only the encoded data set is measured:
    /// the preamble and the file meta group are not included,
    /// so the total file length is not necessarily
    /// a multiple of `file_pad`.
    ///
    /// Padding of sequence items is not available,
    /// `item_pad` must be 0.
    Pad { file_pad: u32, item_pad: u32 },
}

/// Options for writing the DICOM file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteOptions {
    /// the UID of the output transfer syntax
    pub transfer_syntax: String,
    /// group length policy
    pub group_length: GroupLength,
    /// padding policy
    pub padding: Padding,
}

/// Explicit VR Little Endian, without group lengths or padding.
impl Default for WriteOptions {
    fn default() -> Self {
        WriteOptions {
            transfer_syntax: uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string(),
            group_length: GroupLength::default(),
            padding: Padding::default(),
        }
    }
}

impl WriteOptions {
    /// Check that the padding options can be honored.
    pub fn validate(&self) -> Result<()> {
        if let Padding::Pad { file_pad, item_pad } = self.padding {
            ensure!(
                item_pad == 0 && file_pad % 2 == 0,
                InvalidPaddingSnafu { file_pad, item_pad }
            );
        }
        Ok(())
    }
}

/// Read the PDF document at the given path
/// and insert it into the object as the _Encapsulated Document_,
/// along with its _Encapsulated Document Length_.
///
/// A zero byte is appended to documents of odd length.
/// Returns the length of the encapsulated value.
pub fn embed_payload(obj: &mut InMemDicomObject, path: &Path, info: &PdfInfo) -> Result<usize> {
    ensure!(
        info.padded_len() < u64::from(u32::MAX),
        PayloadTooLargeSnafu { len: info.len }
    );
    let len = info.len as usize;
    let bytes = read_padded(path, len)?;
    let padded_len = bytes.len();

    header::ensure_known(tags::ENCAPSULATED_DOCUMENT).context(InsertDocumentSnafu)?;
    obj.put(DataElement::new(
        tags::ENCAPSULATED_DOCUMENT,
        VR::OB,
        PrimitiveValue::from(bytes),
    ));
    obj.put(DataElement::new(
        tags::ENCAPSULATED_DOCUMENT_LENGTH,
        VR::UL,
        PrimitiveValue::from(len as u32),
    ));
    debug!("Encapsulated {} bytes ({} with padding)", len, padded_len);
    Ok(padded_len)
}

/// Read exactly `len` bytes from the file
/// into a buffer of even length.
fn read_padded(path: &Path, len: usize) -> Result<Vec<u8>> {
    let padded_len = len + (len & 1);
    let mut bytes = Vec::new();
    bytes
        .try_reserve_exact(padded_len)
        .context(ResourceExhaustedSnafu { len: padded_len })?;
    // the pad byte, if any, stays zero
    bytes.resize(padded_len, 0);

    let mut file = File::open(path).context(OpenPayloadSnafu { path })?;
    file.read_exact(&mut bytes[..len])
        .context(ReadPayloadSnafu { path })?;
    Ok(bytes)
}

/// Whether the transfer syntax keeps pixel data in native form.
fn has_native_pixel_data(ts: &TransferSyntax) -> bool {
    matches!(ts.codec(), Codec::None | Codec::Dataset(..))
}

/// Make sure that the object's representation
/// is compatible with the given transfer syntax.
///
/// Objects without pixel data are compatible with every transfer syntax
/// and are left as is.
/// Pixel data is never transcoded here,
/// so its current form (native or encapsulated)
/// must already be the one expected by the transfer syntax.
pub fn choose_representation(obj: &InMemDicomObject, ts: &TransferSyntax) -> Result<()> {
    let Ok(pixel_data) = obj.element(tags::PIXEL_DATA) else {
        return Ok(());
    };
    let encapsulated = matches!(pixel_data.value(), DicomValue::PixelSequence { .. });
    let native_ts = has_native_pixel_data(ts);
    ensure!(
        encapsulated != native_ts,
        UnsupportedTransferSyntaxSnafu {
            name: ts.name(),
            reason: if encapsulated {
                "pixel data would need to be decoded"
            } else {
                "pixel data would need to be encoded"
            },
        }
    );
    Ok(())
}

/// Check that the object can be written in the given transfer syntax,
/// by encoding the data set into memory.
///
/// Returns the length of the encoded data set in bytes.
pub fn check_writable(obj: &InMemDicomObject, ts: &TransferSyntax) -> Result<usize> {
    ensure!(
        ts.can_decode_dataset(),
        UnsupportedTransferSyntaxSnafu {
            name: ts.name(),
            reason: "data set codec is not available",
        }
    );
    let mut encoded = Vec::new();
    obj.write_dataset_with_ts(&mut encoded, ts)
        .context(EncodeDataSetSnafu { name: ts.name() })?;
    Ok(encoded.len())
}

/// Remove all group length attributes from the data set.
fn remove_group_lengths(obj: &mut InMemDicomObject) {
    let group_lengths: Vec<Tag> = (&*obj)
        .into_iter()
        .map(|elem| elem.tag())
        .filter(|tag| tag.element() == 0x0000)
        .collect();
    for tag in group_lengths {
        obj.remove_element(tag);
    }
}

/// Append trailing padding to the data set
/// so that its encoded length is a multiple of `file_pad`.
fn pad_data_set(obj: &mut InMemDicomObject, ts: &TransferSyntax, file_pad: u32) -> Result<()> {
    if file_pad == 0 {
        return Ok(());
    }
    obj.put(DataElement::new(
        tags::DATA_SET_TRAILING_PADDING,
        VR::OB,
        PrimitiveValue::from(Vec::<u8>::new()),
    ));
    let len = check_writable(obj, ts)? as u64;
    let file_pad = u64::from(file_pad);
    let pad = ((file_pad - len % file_pad) % file_pad) as usize;
    obj.put(DataElement::new(
        tags::DATA_SET_TRAILING_PADDING,
        VR::OB,
        PrimitiveValue::from(vec![0_u8; pad]),
    ));
    debug!("Data set padded with {} bytes", pad);
    Ok(())
}

/// Resolve a transfer syntax by UID in the registry.
pub fn transfer_syntax(uid: &str) -> Result<&'static TransferSyntax> {
    TransferSyntaxRegistry
        .get(uid)
        .context(UnknownTransferSyntaxSnafu { uid })
}

/// Write the encapsulated document object to a DICOM file
/// with a file meta group,
/// in the transfer syntax given by the options.
///
/// The transfer syntax is negotiated before anything is written:
/// if the object cannot be written in it,
/// no file is created.
pub fn write_encapsulated(
    mut obj: InMemDicomObject,
    output: &Path,
    options: &WriteOptions,
) -> Result<()> {
    options.validate()?;
    let ts = transfer_syntax(&options.transfer_syntax)?;

    choose_representation(&obj, ts)?;
    if options.group_length == GroupLength::Remove {
        remove_group_lengths(&mut obj);
    }
    let len = check_writable(&obj, ts)?;
    debug!("Output transfer syntax {} can be written ({} bytes)", ts.name(), len);

    if let Padding::Pad { file_pad, .. } = options.padding {
        pad_data_set(&mut obj, ts, file_pad)?;
    }

    let mut meta = FileMetaTableBuilder::new()
        .transfer_syntax(ts.uid())
        .media_storage_sop_class_uid(uids::ENCAPSULATED_PDF_STORAGE);
    if let Ok(elem) = obj.element(tags::SOP_INSTANCE_UID) {
        if let Ok(uid) = elem.to_str() {
            meta = meta.media_storage_sop_instance_uid(uid.trim_end_matches('\0'));
        }
    }
    let file = obj.with_meta(meta).context(BuildMetaSnafu)?;

    file.write_to_file(output)
        .context(StorageSnafu { path: output })?;
    Ok(())
}
