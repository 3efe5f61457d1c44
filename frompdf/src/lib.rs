//! DICOM Encapsulated PDF conversion library
//!
//! This library turns a PDF document into
//! an _Encapsulated PDF Storage_ DICOM object,
//! with the document embedded verbatim.
//! It powers the `dicom-frompdf` command line tool.
//!
//! The conversion happens in four steps,
//! each available in its own module:
//!
//! 1. [`payload::validate`] checks that the input is a PDF file;
//! 2. [`identifiers::resolve`] decides on the patient, study and series
//!    identifiers, optionally inheriting them from another DICOM file;
//! 3. [`header::build_header`] fills in the attributes of the new object;
//! 4. [`writer::embed_payload`] embeds the document and
//!    [`writer::write_encapsulated`] writes the DICOM file.
//!
//! # Example
//!
//! ```no_run
//! use dicom_frompdf::{convert, ConvertOptions};
//! use dicom_frompdf::uid::RandomUid;
//!
//! let options = ConvertOptions::default();
//! let outcome = convert("report.pdf", "report.dcm", &options, &RandomUid)?;
//! println!("Created SOP instance {}", outcome.sop_instance_uid);
//! # Result::<(), Box<dyn std::error::Error>>::Ok(())
//! ```
use dicom_object::InMemDicomObject;
use snafu::{ensure, ResultExt, Snafu};
use std::path::Path;
use tracing::info;

pub mod header;
pub mod identifiers;
pub mod payload;
pub mod uid;
pub mod writer;

pub use header::{ConceptName, DocumentInfo};
pub use identifiers::{
    IdentifierOptions, IdentifierSet, InheritMode, InstancePolicy, PatientOverrides,
};
pub use payload::PdfInfo;
pub use uid::{RandomUid, UidGenerator};
pub use writer::{GroupLength, Padding, WriteOptions};

/// Exit code for usage errors, unsupported transfer syntaxes
/// and failures to write the output file.
pub const EXIT_RUNTIME_ERROR: i32 = 1;
/// Exit code for failures to create the DICOM object
/// from the PDF document.
pub const EXIT_ENCAPSULATION_ERROR: i32 = 10;

/// An error which may occur during a conversion.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// invalid filename: <empty string>
    EmptyFilename,

    /// Invalid identifier options
    IdentifierOptions { source: identifiers::Error },

    /// Invalid write options
    WriteOptions { source: writer::Error },

    /// Invalid PDF file
    Payload { source: payload::Error },

    /// Unable to create PDF DICOM encapsulation
    Encapsulate { source: writer::Error },

    /// Unable to create DICOM header
    Header { source: header::Error },

    /// Could not write encapsulated PDF object
    Write { source: writer::Error },
}

impl Error {
    /// The process exit code to report this error with.
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Payload { .. } | Error::Encapsulate { .. } | Error::Header { .. } => {
                EXIT_ENCAPSULATION_ERROR
            }
            Error::EmptyFilename
            | Error::IdentifierOptions { .. }
            | Error::WriteOptions { .. }
            | Error::Write { .. } => EXIT_RUNTIME_ERROR,
        }
    }

    /// Whether the object could not be written
    /// in the requested transfer syntax.
    pub fn is_unsupported_transfer_syntax(&self) -> bool {
        match self {
            Error::Write { source } => source.is_unsupported_transfer_syntax(),
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// All options of a conversion.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConvertOptions {
    /// how to obtain the patient, study and series identifiers
    pub identifiers: IdentifierOptions,
    /// document title and annotation
    pub document: DocumentInfo,
    /// output transfer syntax and encoding
    pub write: WriteOptions,
}

/// The outcome of a successful conversion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Converted {
    /// properties of the input document
    pub pdf: PdfInfo,
    /// the identifiers used in the new object
    pub identifiers: IdentifierSet,
    /// the UID of the new SOP instance
    pub sop_instance_uid: String,
}

/// Convert the PDF file at `input`
/// into an Encapsulated PDF DICOM file at `output`.
///
/// New UIDs are obtained from `uids`.
/// Options are checked before the input file is opened,
/// and the output file is only created
/// once the object is known to be writable.
pub fn convert<G>(
    input: impl AsRef<Path>,
    output: impl AsRef<Path>,
    options: &ConvertOptions,
    uids: &G,
) -> Result<Converted>
where
    G: UidGenerator + ?Sized,
{
    let input = input.as_ref();
    let output = output.as_ref();
    ensure!(!input.as_os_str().is_empty(), EmptyFilenameSnafu);
    options.identifiers.validate().context(IdentifierOptionsSnafu)?;
    options.write.validate().context(WriteOptionsSnafu)?;

    let pdf = payload::validate(input).context(PayloadSnafu)?;
    info!("file {}: {}", input.display(), pdf);

    let ids = identifiers::resolve(&options.identifiers, uids);

    info!("creating encapsulated PDF object");
    let mut obj = InMemDicomObject::new_empty();
    writer::embed_payload(&mut obj, input, &pdf).context(EncapsulateSnafu)?;
    let sop_instance_uid =
        header::build_header(&mut obj, &ids, &options.document, uids).context(HeaderSnafu)?;

    info!("writing encapsulated PDF object as file {}", output.display());
    writer::write_encapsulated(obj, output, &options.write).context(WriteSnafu)?;
    info!("conversion successful");

    Ok(Converted {
        pdf,
        identifiers: ids,
        sop_instance_uid,
    })
}
