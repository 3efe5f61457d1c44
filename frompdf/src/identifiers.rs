//! Resolution of the patient, study and series identifiers
//! of the DICOM object to create.
//!
//! Identifiers are either generated anew
//! or inherited from an existing DICOM file,
//! so that the encapsulated document can join
//! an existing study (or series) of the same patient.
use crate::uid::UidGenerator;
use dicom_core::Tag;
use dicom_dictionary_std::tags;
use dicom_object::{InMemDicomObject, OpenFileOptions, ReadError};
use snafu::{ensure, Report, Snafu};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// An error in the combination of identifier options.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Patient data cannot be given when reading patient data from a file
    PatientOverridesWithReference,

    /// The instance number can only be incremented when reading series data from a file
    IncrementWithoutSeries,

    /// Instance number {number} is not positive
    NonPositiveInstanceNumber { number: i32 },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Where the study and series identifiers come from.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub enum InheritMode {
    /// Generate new study and series instance UIDs
    #[default]
    Generate,
    /// Read patient and study data from the given DICOM file,
    /// generating a new series
    Study(PathBuf),
    /// Read patient, study and series data from the given DICOM file
    Series(PathBuf),
}

impl InheritMode {
    /// The DICOM file to inherit identifiers from, if any.
    pub fn reference(&self) -> Option<&Path> {
        match self {
            InheritMode::Generate => None,
            InheritMode::Study(path) | InheritMode::Series(path) => Some(path),
        }
    }

    /// Whether series identifiers are inherited as well.
    pub fn is_series_scope(&self) -> bool {
        matches!(self, InheritMode::Series(_))
    }
}

/// How the instance number is decided.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum InstancePolicy {
    /// Use the given instance number
    Fixed(i32),
    /// Use the instance number of the reference file plus one
    Increment,
}

/// Instance number 1 is used by default.
impl Default for InstancePolicy {
    fn default() -> Self {
        InstancePolicy::Fixed(1)
    }
}

/// Patient data given explicitly by the user.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PatientOverrides {
    /// patient's name in DICOM PN syntax
    pub name: Option<String>,
    /// patient identifier
    pub id: Option<String>,
    /// patient's birth date (YYYYMMDD)
    pub birth_date: Option<String>,
    /// patient's sex (M, F or O)
    pub sex: Option<String>,
}

impl PatientOverrides {
    /// Whether no patient attribute was given.
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.id.is_none() && self.birth_date.is_none() && self.sex.is_none()
    }
}

/// Options driving identifier resolution.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdentifierOptions {
    pub inherit: InheritMode,
    pub instance: InstancePolicy,
    pub patient: PatientOverrides,
}

impl IdentifierOptions {
    /// Check that the options can be used together.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.patient.is_empty() || self.inherit.reference().is_none(),
            PatientOverridesWithReferenceSnafu
        );
        match self.instance {
            InstancePolicy::Increment => {
                ensure!(self.inherit.is_series_scope(), IncrementWithoutSeriesSnafu)
            }
            InstancePolicy::Fixed(number) => {
                ensure!(number > 0, NonPositiveInstanceNumberSnafu { number })
            }
        }
        Ok(())
    }
}

/// The identifiers of the object to create.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct IdentifierSet {
    pub study_instance_uid: String,
    pub series_instance_uid: String,
    pub instance_number: i32,
    pub patient_name: String,
    pub patient_id: String,
    pub patient_birth_date: String,
    pub patient_sex: String,
}

/// Identifying attributes found in a reference DICOM object.
///
/// Attributes which are missing or empty are `None`.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReferenceIdentifiers {
    pub patient_name: Option<String>,
    pub patient_id: Option<String>,
    pub patient_birth_date: Option<String>,
    pub patient_sex: Option<String>,
    pub study_instance_uid: Option<String>,
    pub series_instance_uid: Option<String>,
    pub instance_number: Option<i32>,
}

impl ReferenceIdentifiers {
    /// Collect the identifying attributes of a DICOM object.
    pub fn from_object(obj: &InMemDicomObject) -> Self {
        ReferenceIdentifiers {
            patient_name: string_of(obj, tags::PATIENT_NAME),
            patient_id: string_of(obj, tags::PATIENT_ID),
            patient_birth_date: string_of(obj, tags::PATIENT_BIRTH_DATE),
            patient_sex: string_of(obj, tags::PATIENT_SEX),
            study_instance_uid: string_of(obj, tags::STUDY_INSTANCE_UID),
            series_instance_uid: string_of(obj, tags::SERIES_INSTANCE_UID),
            instance_number: obj
                .element(tags::INSTANCE_NUMBER)
                .ok()
                .and_then(|e| e.to_int::<i32>().ok()),
        }
    }

    /// The instance number which should follow the reference instance,
    /// or 0 if the reference has no readable instance number.
    pub fn next_instance_number(&self) -> i32 {
        self.instance_number
            .map(|n| n.saturating_add(1))
            .unwrap_or(0)
    }
}

fn string_of(obj: &InMemDicomObject, tag: Tag) -> Option<String> {
    let value = obj.element(tag).ok()?.to_str().ok()?;
    let value = value.trim_end_matches([' ', '\0']);
    if value.is_empty() {
        None
    } else {
        Some(value.to_string())
    }
}

/// Read the identifying attributes of the DICOM file at the given path.
///
/// Reading stops before the encapsulated document or pixel data,
/// which are never needed.
pub fn load_reference(path: &Path) -> Result<ReferenceIdentifiers, ReadError> {
    let obj = OpenFileOptions::new()
        .read_until(tags::ENCAPSULATED_DOCUMENT)
        .open_file(path)?;
    Ok(ReferenceIdentifiers::from_object(&obj))
}

/// Determine the identifiers of the new object.
///
/// When the options name a reference file,
/// patient and study data (and series data, in series scope)
/// are copied from it.
/// A reference file which cannot be read is reported as a warning
/// and resolution continues as if no file was given.
/// Explicit patient data takes precedence over inherited values.
/// Missing study and series instance UIDs are generated.
///
/// This function never fails:
/// options should be checked beforehand with [`IdentifierOptions::validate`].
pub fn resolve<G>(options: &IdentifierOptions, uids: &G) -> IdentifierSet
where
    G: UidGenerator + ?Sized,
{
    let reference = options
        .inherit
        .reference()
        .and_then(|path| match load_reference(path) {
            Ok(reference) => {
                debug!("Read identifiers from {}", path.display());
                Some(reference)
            }
            Err(e) => {
                warn!(
                    "Could not read file {}, generating new identifiers: {}",
                    path.display(),
                    Report::from_error(e)
                );
                None
            }
        })
        .unwrap_or_default();

    resolve_with(options, reference, uids)
}

/// Determine the identifiers of the new object
/// from identifiers already read from a reference object.
pub fn resolve_with<G>(
    options: &IdentifierOptions,
    reference: ReferenceIdentifiers,
    uids: &G,
) -> IdentifierSet
where
    G: UidGenerator + ?Sized,
{
    let next_instance_number = reference.next_instance_number();
    let series_scope = options.inherit.is_series_scope();
    let patient = &options.patient;

    let ReferenceIdentifiers {
        patient_name,
        patient_id,
        patient_birth_date,
        patient_sex,
        study_instance_uid,
        series_instance_uid,
        instance_number: _,
    } = reference;

    let pick = |given: &Option<String>, inherited: Option<String>| {
        given.clone().or(inherited).unwrap_or_default()
    };

    let study_instance_uid = study_instance_uid.unwrap_or_else(|| uids.generate_uid());
    let series_instance_uid = series_instance_uid
        .filter(|_| series_scope)
        .unwrap_or_else(|| uids.generate_uid());

    let instance_number = match options.instance {
        InstancePolicy::Fixed(number) => number,
        InstancePolicy::Increment => next_instance_number,
    };

    IdentifierSet {
        study_instance_uid,
        series_instance_uid,
        instance_number,
        patient_name: pick(&patient.name, patient_name),
        patient_id: pick(&patient.id, patient_id),
        patient_birth_date: pick(&patient.birth_date, patient_birth_date),
        patient_sex: pick(&patient.sex, patient_sex),
    }
}
