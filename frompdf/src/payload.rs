//! Inspection of PDF payloads prior to encapsulation.
//!
//! The payload is only probed here:
//! the first bytes of the file are checked for the PDF magic code
//! and the version number which follows it.
//! The document itself is never parsed nor modified,
//! as it is embedded verbatim into the DICOM object.
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

/// The magic code at the start of every PDF document.
pub const PDF_MAGIC: &[u8; 5] = b"%PDF-";

/// Maximum number of bytes read when probing the file header.
const PROBE_LENGTH: u64 = 100;

/// Maximum number of bytes after the magic code
/// in which the version number must be terminated by a line break.
const VERSION_SEARCH_LENGTH: usize = 5;

/// An error which may occur when validating a PDF payload.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    #[snafu(display("file {} not found", path.display()))]
    NotFound {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("file {} is empty", path.display()))]
    Empty { path: PathBuf },

    #[snafu(display("read error in file {}", path.display()))]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("file {} is not a PDF file", path.display()))]
    NotPdf { path: PathBuf },

    #[snafu(display("file {}: unable to decode PDF version number", path.display()))]
    UnknownVersion { path: PathBuf },
}

impl Error {
    /// Whether the file was readable but is not a well-formed PDF document.
    pub fn is_format_error(&self) -> bool {
        matches!(self, Error::NotPdf { .. } | Error::UnknownVersion { .. })
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Properties of a PDF file which passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfInfo {
    /// the size of the file in bytes
    pub len: u64,
    /// the PDF version declared in the file header (e.g. `1.4`)
    pub version: String,
}

impl PdfInfo {
    /// The size of the file in kibibytes, rounded up.
    pub fn size_kib(&self) -> u64 {
        self.len.div_ceil(1024)
    }

    /// Whether the document needs a trailing padding byte
    /// to be encapsulated.
    pub fn is_odd_length(&self) -> bool {
        self.len % 2 == 1
    }

    /// The length of the document once padded to an even number of bytes.
    pub fn padded_len(&self) -> u64 {
        self.len + (self.len & 1)
    }
}

impl fmt::Display for PdfInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PDF {}, {}kB", self.version, self.size_kib())
    }
}

/// Check that the file at the given path is a PDF document,
/// retrieving its size and version.
///
/// Only the first few bytes of the file are read.
/// The file is closed before this function returns.
pub fn validate(path: impl AsRef<Path>) -> Result<PdfInfo> {
    let path = path.as_ref();
    let mut file = File::open(path).context(NotFoundSnafu { path })?;
    let len = file.metadata().context(NotFoundSnafu { path })?.len();

    ensure!(len > 0, EmptySnafu { path });

    let mut buf = [0_u8; PROBE_LENGTH as usize];
    let header = &mut buf[..len.min(PROBE_LENGTH) as usize];
    file.read_exact(header).context(ReadSnafu { path })?;

    ensure!(header.starts_with(PDF_MAGIC), NotPdfSnafu { path });
    let version = version_tag(&header[PDF_MAGIC.len()..]).context(UnknownVersionSnafu { path })?;

    Ok(PdfInfo { len, version })
}

/// Extract the version number which follows the magic code,
/// expected to be terminated by a line feed or carriage return.
fn version_tag(data: &[u8]) -> Option<String> {
    let end = data
        .iter()
        .take(VERSION_SEARCH_LENGTH)
        .position(|&b| b == b'\n' || b == b'\r')?;
    Some(String::from_utf8_lossy(&data[..end]).into_owned())
}

#[cfg(test)]
mod tests {
    use super::{validate, version_tag, Error};
    use std::io::Write;

    fn pdf_file(content: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn finds_version_terminated_by_line_break() {
        assert_eq!(version_tag(b"1.4\n%%EOF").as_deref(), Some("1.4"));
        assert_eq!(version_tag(b"1.7\r\n").as_deref(), Some("1.7"));
        assert_eq!(version_tag(b"2.0\r").as_deref(), Some("2.0"));
        // line break is the 5th byte after the magic code
        assert_eq!(version_tag(b"1.4ab\n").as_deref(), None);
        assert_eq!(version_tag(b"1.4a\n").as_deref(), Some("1.4a"));
        assert_eq!(version_tag(b"1.4").as_deref(), None);
    }

    #[test]
    fn validates_minimal_pdf() {
        let file = pdf_file(b"%PDF-1.4\n%");
        let info = validate(file.path()).unwrap();
        assert_eq!(info.len, 10);
        assert_eq!(info.version, "1.4");
        assert!(!info.is_odd_length());
        assert_eq!(info.padded_len(), 10);
        assert_eq!(info.to_string(), "PDF 1.4, 1kB");
    }

    #[test]
    fn validates_longer_pdf() {
        let mut content = b"%PDF-1.7\r\n".to_vec();
        content.resize(3001, b'x');
        let file = pdf_file(&content);
        let info = validate(file.path()).unwrap();
        assert_eq!(info.len, 3001);
        assert_eq!(info.version, "1.7");
        assert!(info.is_odd_length());
        assert_eq!(info.padded_len(), 3002);
        assert_eq!(info.size_kib(), 3);
    }

    #[test]
    fn rejects_missing_magic_code() {
        let file = pdf_file(b"%!PS-Adobe-3.0\n");
        let err = validate(file.path()).unwrap_err();
        assert!(matches!(err, Error::NotPdf { .. }), "got {:?}", err);
        assert!(err.is_format_error());

        // shorter than the magic code itself
        let file = pdf_file(b"%PD");
        let err = validate(file.path()).unwrap_err();
        assert!(matches!(err, Error::NotPdf { .. }), "got {:?}", err);
    }

    #[test]
    fn rejects_undecodable_version() {
        let file = pdf_file(b"%PDF-1.4 with no line break");
        let err = validate(file.path()).unwrap_err();
        assert!(matches!(err, Error::UnknownVersion { .. }), "got {:?}", err);
        assert!(err.is_format_error());
    }

    #[test]
    fn rejects_empty_file() {
        let file = pdf_file(b"");
        let err = validate(file.path()).unwrap_err();
        assert!(matches!(err, Error::Empty { .. }), "got {:?}", err);
        assert!(!err.is_format_error());
    }

    #[test]
    fn rejects_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate(dir.path().join("nothing-here.pdf")).unwrap_err();
        assert!(matches!(err, Error::NotFound { .. }), "got {:?}", err);
    }
}
