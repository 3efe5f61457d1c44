//! A CLI tool for encapsulating a PDF document
//! into a DICOM file (Encapsulated PDF Storage).
use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use dicom_dictionary_std::uids;
use dicom_frompdf::{
    convert, ConceptName, ConvertOptions, DocumentInfo, GroupLength, IdentifierOptions,
    InheritMode, InstancePolicy, Padding, PatientOverrides, RandomUid, WriteOptions,
    EXIT_RUNTIME_ERROR,
};
use snafu::{Report, ResultExt, Whatever};
use tracing::Level;
use tracing_subscriber::fmt::writer::MakeWriterExt;

/// Convert a PDF file into a DICOM Encapsulated PDF file
#[derive(Debug, Parser)]
#[command(version)]
struct App {
    /// Path to the PDF file to convert
    pdf_file: PathBuf,

    /// Path to the output DICOM file
    /// (default is to replace input extension with `.dcm`)
    dcm_file: Option<PathBuf>,

    /// Print progress information
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Print debug information
    #[arg(short = 'd', long = "debug")]
    debug: bool,

    /// The document contains patient identifying data (default)
    #[arg(long = "annotation-yes", overrides_with = "annotation_no")]
    annotation_yes: bool,

    /// The document does not contain patient identifying data
    #[arg(long = "annotation-no", overrides_with = "annotation_yes")]
    annotation_no: bool,

    /// Document title
    #[arg(long = "title", default_value = "")]
    title: String,

    /// Document title as a coded concept
    #[arg(
        long = "concept-name",
        num_args = 3,
        value_names = ["CSD", "CV", "CM"]
    )]
    concept_name: Option<Vec<String>>,

    /// Patient's name
    #[arg(long = "patient-name", conflicts_with_all = ["study_from", "series_from"])]
    patient_name: Option<String>,

    /// Patient ID
    #[arg(long = "patient-id", conflicts_with_all = ["study_from", "series_from"])]
    patient_id: Option<String>,

    /// Patient's birth date (YYYYMMDD)
    #[arg(long = "patient-birthdate", conflicts_with_all = ["study_from", "series_from"])]
    patient_birthdate: Option<String>,

    /// Patient's sex (M, F or O)
    #[arg(long = "patient-sex", conflicts_with_all = ["study_from", "series_from"])]
    patient_sex: Option<String>,

    /// Generate new study and series UIDs (default)
    #[arg(long = "generate", conflicts_with_all = ["study_from", "series_from"])]
    generate: bool,

    /// Read patient and study data from a DICOM file
    #[arg(long = "study-from", value_name = "FILE", conflicts_with = "series_from")]
    study_from: Option<PathBuf>,

    /// Read patient, study and series data from a DICOM file
    #[arg(long = "series-from", value_name = "FILE", conflicts_with = "study_from")]
    series_from: Option<PathBuf>,

    /// Use instance number 1 (default, not with --series-from)
    #[arg(
        long = "instance-one",
        conflicts_with_all = ["series_from", "instance_inc", "instance_set"]
    )]
    instance_one: bool,

    /// Increment the instance number of the file given with --series-from
    #[arg(
        long = "instance-inc",
        requires = "series_from",
        conflicts_with = "instance_set"
    )]
    instance_inc: bool,

    /// Use the given instance number
    #[arg(
        long = "instance-set",
        value_name = "N",
        value_parser(clap::value_parser!(i32).range(1..))
    )]
    instance_set: Option<i32>,

    /// UID of the output transfer syntax
    /// (default is Explicit VR Little Endian)
    #[arg(long = "ts", value_name = "UID", conflicts_with_all = ["implicit", "big_endian", "deflated"])]
    transfer_syntax: Option<String>,

    /// Write with Implicit VR Little Endian
    #[arg(long = "implicit", conflicts_with_all = ["big_endian", "deflated"])]
    implicit: bool,

    /// Write with Explicit VR Big Endian
    #[arg(long = "big-endian", conflicts_with = "deflated")]
    big_endian: bool,

    /// Write with Deflated Explicit VR Little Endian
    #[arg(long = "deflated")]
    deflated: bool,

    /// Whether to keep group length elements
    #[arg(long = "group-length", value_enum, default_value_t = GroupLengthArg::Remove)]
    group_length: GroupLengthArg,

    /// Pad the data set to a multiple of N bytes (0 for no padding)
    #[arg(long = "file-pad", value_name = "N", default_value = "0")]
    file_pad: u32,

    /// Pad items to a multiple of N bytes (only 0 is supported)
    #[arg(long = "item-pad", value_name = "N", default_value = "0")]
    item_pad: u32,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
enum GroupLengthArg {
    /// Remove all group length elements
    Remove,
    /// Keep group length elements as they are
    Keep,
}

impl App {
    fn output(&self) -> PathBuf {
        self.dcm_file.clone().unwrap_or_else(|| {
            let mut path = self.pdf_file.clone();
            path.set_extension("dcm");
            path
        })
    }

    fn options(&self) -> ConvertOptions {
        let inherit = match (&self.study_from, &self.series_from) {
            (_, Some(path)) => InheritMode::Series(path.clone()),
            (Some(path), None) => InheritMode::Study(path.clone()),
            (None, None) => InheritMode::Generate,
        };

        let instance = if let Some(number) = self.instance_set {
            InstancePolicy::Fixed(number)
        } else if self.instance_inc || (self.series_from.is_some() && !self.instance_one) {
            InstancePolicy::Increment
        } else {
            InstancePolicy::Fixed(1)
        };

        let patient = PatientOverrides {
            name: self.patient_name.clone(),
            id: self.patient_id.clone(),
            birth_date: self.patient_birthdate.clone(),
            sex: self.patient_sex.clone(),
        };

        let concept_name = match self.concept_name.as_deref() {
            Some([csd, cv, cm]) => Some(ConceptName::new(csd, cv, cm)),
            _ => None,
        };

        #[allow(deprecated)]
        let transfer_syntax = if let Some(uid) = &self.transfer_syntax {
            uid.trim().to_string()
        } else if self.implicit {
            uids::IMPLICIT_VR_LITTLE_ENDIAN.to_string()
        } else if self.big_endian {
            uids::EXPLICIT_VR_BIG_ENDIAN.to_string()
        } else if self.deflated {
            uids::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN.to_string()
        } else {
            uids::EXPLICIT_VR_LITTLE_ENDIAN.to_string()
        };

        let padding = if self.file_pad == 0 && self.item_pad == 0 {
            Padding::None
        } else {
            Padding::Pad {
                file_pad: self.file_pad,
                item_pad: self.item_pad,
            }
        };

        ConvertOptions {
            identifiers: IdentifierOptions {
                inherit,
                instance,
                patient,
            },
            document: DocumentInfo {
                title: self.title.clone(),
                concept_name,
                burned_in_annotation: !self.annotation_no,
            },
            write: WriteOptions {
                transfer_syntax,
                group_length: match self.group_length {
                    GroupLengthArg::Remove => GroupLength::Remove,
                    GroupLengthArg::Keep => GroupLength::Keep,
                },
                padding,
            },
        }
    }
}

/// Progress goes to stdout, warnings and errors to stderr.
fn log_subscriber(level: Level) -> impl tracing::Subscriber + Send + Sync + 'static {
    tracing_subscriber::FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr.with_max_level(Level::WARN).or_else(std::io::stdout))
        .finish()
}

fn main() {
    let app = App::try_parse().unwrap_or_else(|e| {
        if e.use_stderr() {
            let _ = e.print();
            std::process::exit(EXIT_RUNTIME_ERROR);
        }
        e.exit()
    });

    let level = if app.debug {
        Level::TRACE
    } else if app.verbose {
        Level::INFO
    } else {
        Level::WARN
    };
    tracing::subscriber::set_global_default(log_subscriber(level))
    .whatever_context("Could not set up global logging subscriber")
    .unwrap_or_else(|e: Whatever| {
        eprintln!("[ERROR] {}", Report::from_error(e));
    });

    let output = app.output();
    if let Err(e) = convert(&app.pdf_file, &output, &app.options(), &RandomUid) {
        let code = e.exit_code();
        eprintln!("[ERROR] {}", Report::from_error(e));
        std::process::exit(code);
    }
}

#[cfg(test)]
mod tests {
    use super::{log_subscriber, App};
    use clap::{CommandFactory, Parser};
    use dicom_dictionary_std::uids;
    use dicom_frompdf::{ConceptName, GroupLength, InheritMode, InstancePolicy, Padding};
    use std::path::PathBuf;
    use tracing::Level;

    #[test]
    fn verify_cli() {
        App::command().debug_assert();
    }

    #[test]
    fn defaults() {
        let app = App::try_parse_from(["dicom-frompdf", "report.pdf"]).unwrap();
        assert_eq!(app.output(), PathBuf::from("report.dcm"));

        let options = app.options();
        assert_eq!(options.identifiers.inherit, InheritMode::Generate);
        assert_eq!(options.identifiers.instance, InstancePolicy::Fixed(1));
        assert!(options.identifiers.patient.is_empty());
        assert!(options.document.burned_in_annotation);
        assert_eq!(options.document.title, "");
        assert_eq!(options.write.transfer_syntax, uids::EXPLICIT_VR_LITTLE_ENDIAN);
        assert_eq!(options.write.group_length, GroupLength::Remove);
        assert_eq!(options.write.padding, Padding::None);
    }

    #[test]
    fn document_options() {
        let app = App::try_parse_from([
            "dicom-frompdf",
            "--annotation-no",
            "--title",
            "Discharge summary",
            "--concept-name",
            "LN",
            "18842-5",
            "Discharge summary",
            "report.pdf",
            "out.dcm",
        ])
        .unwrap();
        assert_eq!(app.output(), PathBuf::from("out.dcm"));

        let options = app.options();
        assert!(!options.document.burned_in_annotation);
        assert_eq!(options.document.title, "Discharge summary");
        assert_eq!(
            options.document.concept_name,
            Some(ConceptName::new("LN", "18842-5", "Discharge summary"))
        );
    }

    #[test]
    fn last_annotation_option_wins() {
        let app = App::try_parse_from([
            "dicom-frompdf",
            "--annotation-no",
            "--annotation-yes",
            "report.pdf",
        ])
        .unwrap();
        assert!(app.options().document.burned_in_annotation);
    }

    #[test]
    fn series_from_defaults_to_increment() {
        let app =
            App::try_parse_from(["dicom-frompdf", "--series-from", "prior.dcm", "report.pdf"])
                .unwrap();
        let options = app.options();
        assert_eq!(
            options.identifiers.inherit,
            InheritMode::Series(PathBuf::from("prior.dcm"))
        );
        assert_eq!(options.identifiers.instance, InstancePolicy::Increment);

        let app = App::try_parse_from([
            "dicom-frompdf",
            "--series-from",
            "prior.dcm",
            "--instance-set",
            "7",
            "report.pdf",
        ])
        .unwrap();
        assert_eq!(app.options().identifiers.instance, InstancePolicy::Fixed(7));
    }

    #[test]
    fn conflicting_options_are_rejected() {
        let rejected: &[&[&str]] = &[
            &["dicom-frompdf", "--patient-name", "Doe^John", "--study-from", "a.dcm", "x.pdf"],
            &["dicom-frompdf", "--generate", "--series-from", "a.dcm", "x.pdf"],
            &["dicom-frompdf", "--study-from", "a.dcm", "--series-from", "b.dcm", "x.pdf"],
            &["dicom-frompdf", "--instance-one", "--series-from", "a.dcm", "x.pdf"],
            &["dicom-frompdf", "--instance-inc", "x.pdf"],
            &["dicom-frompdf", "--instance-set", "0", "x.pdf"],
            &["dicom-frompdf", "--implicit", "--deflated", "x.pdf"],
            &["dicom-frompdf", "--concept-name", "LN", "18842-5", "x.pdf"],
            &["dicom-frompdf"],
        ];
        for args in rejected {
            let e = App::try_parse_from(*args).unwrap_err();
            assert!(e.use_stderr(), "{:?} should be a usage error", args);
        }
    }

    #[test]
    fn encoding_options() {
        let app = App::try_parse_from([
            "dicom-frompdf",
            "--implicit",
            "--group-length",
            "keep",
            "--file-pad",
            "128",
            "report.pdf",
        ])
        .unwrap();
        let options = app.options();
        assert_eq!(options.write.transfer_syntax, uids::IMPLICIT_VR_LITTLE_ENDIAN);
        assert_eq!(options.write.group_length, GroupLength::Keep);
        assert_eq!(
            options.write.padding,
            Padding::Pad {
                file_pad: 128,
                item_pad: 0
            }
        );

        let app =
            App::try_parse_from(["dicom-frompdf", "--ts", " 1.2.840.10008.1.2.2 ", "report.pdf"])
                .unwrap();
        assert_eq!(app.options().write.transfer_syntax, "1.2.840.10008.1.2.2");
    }

    #[test]
    #[allow(deprecated)]
    fn transfer_syntax_shorthands() {
        let app = App::try_parse_from(["dicom-frompdf", "--big-endian", "report.pdf"]).unwrap();
        assert_eq!(app.options().write.transfer_syntax, uids::EXPLICIT_VR_BIG_ENDIAN);

        let app = App::try_parse_from(["dicom-frompdf", "--deflated", "report.pdf"]).unwrap();
        assert_eq!(
            app.options().write.transfer_syntax,
            uids::DEFLATED_EXPLICIT_VR_LITTLE_ENDIAN
        );
    }

    #[test]
    fn log_levels() {
        tracing::subscriber::with_default(log_subscriber(Level::WARN), || {
            assert!(tracing::enabled!(Level::WARN));
            assert!(!tracing::enabled!(Level::INFO));
        });
        tracing::subscriber::with_default(log_subscriber(Level::INFO), || {
            assert!(tracing::enabled!(Level::INFO));
            assert!(!tracing::enabled!(Level::DEBUG));
        });
    }
}
