//! Construction of the attributes of an Encapsulated PDF object
//! (everything except the encapsulated document itself).
//!
//! Attributes are inserted one at a time through [`put_checked`],
//! which only accepts attributes of the standard data dictionary.
//! Values are inserted as given:
//! malformed dates, numbers and UIDs
//! (as often found in inherited patient data)
//! are reported as warnings.
//! The first attribute which cannot be inserted
//! interrupts the construction of the header.
use crate::identifiers::IdentifierSet;
use crate::uid::{is_valid_uid, UidGenerator};
use chrono::Local;
use dicom_core::dictionary::{DataDictionary, DataDictionaryEntry};
use dicom_core::value::deserialize::parse_date;
use dicom_core::value::{partial, DataSetSequence, DicomDate, DicomTime};
use dicom_core::{DataElement, PrimitiveValue, Tag, VR};
use dicom_dictionary_std::{tags, uids, StandardDataDictionary};
use dicom_object::mem::InMemElement;
use dicom_object::InMemDicomObject;
use snafu::{ensure, OptionExt, ResultExt, Snafu};
use tracing::{trace, warn};

/// Type 2 attributes which are always present but left empty.
pub const EMPTY_TYPE2_ATTRIBUTES: &[(Tag, VR)] = &[
    (tags::STUDY_DATE, VR::DA),
    (tags::STUDY_TIME, VR::TM),
    (tags::ACCESSION_NUMBER, VR::SH),
    (tags::MANUFACTURER, VR::LO),
    (tags::REFERRING_PHYSICIAN_NAME, VR::PN),
    (tags::STUDY_ID, VR::SH),
    (tags::CONTENT_DATE, VR::DA),
    (tags::CONTENT_TIME, VR::TM),
    (tags::ACQUISITION_DATE_TIME, VR::DT),
];

/// Attributes with the same value in every encapsulated PDF object.
///
/// There is no meaningful way to number the series,
/// so the series number is always 1.
pub const CONSTANT_ATTRIBUTES: &[(Tag, VR, &str)] = &[
    (tags::SPECIFIC_CHARACTER_SET, VR::CS, "ISO_IR 100"),
    (tags::SOP_CLASS_UID, VR::UI, uids::ENCAPSULATED_PDF_STORAGE),
    (tags::MODALITY, VR::CS, "OT"),
    (tags::CONVERSION_TYPE, VR::CS, "WSD"),
    (
        tags::MIME_TYPE_OF_ENCAPSULATED_DOCUMENT,
        VR::LO,
        "application/pdf",
    ),
    (tags::SERIES_NUMBER, VR::IS, "1"),
];

/// A value which does not conform to its value representation.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum ValueError {
    /// `{value}` is not a valid {vr:?} value
    Malformed { vr: VR, value: String },
}

/// An error which may occur when building the header.
#[derive(Debug, Snafu)]
#[non_exhaustive]
pub enum Error {
    /// Could not insert attribute {tag}: not in the standard data dictionary
    UnknownAttribute { tag: Tag },

    /// Could not represent the instance creation date and time
    CreationTimestamp { source: partial::Error },
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// A coded concept, as one item of a code sequence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConceptName {
    pub coding_scheme_designator: String,
    pub code_value: String,
    pub code_meaning: String,
}

impl ConceptName {
    pub fn new(
        coding_scheme_designator: impl Into<String>,
        code_value: impl Into<String>,
        code_meaning: impl Into<String>,
    ) -> Self {
        ConceptName {
            coding_scheme_designator: coding_scheme_designator.into(),
            code_value: code_value.into(),
            code_meaning: code_meaning.into(),
        }
    }
}

/// Document level information given by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentInfo {
    /// the document title
    pub title: String,
    /// the document title as a coded concept
    pub concept_name: Option<ConceptName>,
    /// whether the document contains patient identifying data
    pub burned_in_annotation: bool,
}

/// An untitled document which may contain patient identifying data.
impl Default for DocumentInfo {
    fn default() -> Self {
        DocumentInfo {
            title: String::new(),
            concept_name: None,
            burned_in_annotation: true,
        }
    }
}

/// Fill the given object with the attributes of an Encapsulated PDF object.
///
/// A new SOP instance UID is always generated,
/// even if the study and series are inherited.
/// The instance creation date and time are taken from the local clock.
/// Returns the generated SOP instance UID.
///
/// If an attribute cannot be inserted,
/// the object is left partially filled and should be discarded.
pub fn build_header<G>(
    obj: &mut InMemDicomObject,
    ids: &IdentifierSet,
    doc: &DocumentInfo,
    uids: &G,
) -> Result<String>
where
    G: UidGenerator + ?Sized,
{
    for &(tag, vr) in EMPTY_TYPE2_ATTRIBUTES {
        put_empty(obj, tag, vr)?;
    }

    match &doc.concept_name {
        Some(concept) => put_code_sequence(obj, tags::CONCEPT_NAME_CODE_SEQUENCE, concept)?,
        None => put_empty(obj, tags::CONCEPT_NAME_CODE_SEQUENCE, VR::SQ)?,
    }

    for &(tag, vr, value) in CONSTANT_ATTRIBUTES {
        put_checked(obj, tag, vr, value)?;
    }

    let annotation = if doc.burned_in_annotation { "YES" } else { "NO" };
    put_checked(obj, tags::DOCUMENT_TITLE, VR::ST, &doc.title)?;
    put_checked(obj, tags::PATIENT_NAME, VR::PN, &ids.patient_name)?;
    put_checked(obj, tags::PATIENT_ID, VR::LO, &ids.patient_id)?;
    put_checked(obj, tags::PATIENT_BIRTH_DATE, VR::DA, &ids.patient_birth_date)?;
    put_checked(obj, tags::PATIENT_SEX, VR::CS, &ids.patient_sex)?;
    put_checked(obj, tags::BURNED_IN_ANNOTATION, VR::CS, annotation)?;
    put_checked(
        obj,
        tags::INSTANCE_NUMBER,
        VR::IS,
        &ids.instance_number.to_string(),
    )?;

    let sop_instance_uid = uids.generate_uid();
    put_checked(obj, tags::STUDY_INSTANCE_UID, VR::UI, &ids.study_instance_uid)?;
    put_checked(obj, tags::SERIES_INSTANCE_UID, VR::UI, &ids.series_instance_uid)?;
    put_checked(obj, tags::SOP_INSTANCE_UID, VR::UI, &sop_instance_uid)?;

    let now = Local::now().naive_local();
    let date = DicomDate::try_from(&now.date()).context(CreationTimestampSnafu)?;
    let time = DicomTime::try_from(&now.time()).context(CreationTimestampSnafu)?;
    put_value(obj, tags::INSTANCE_CREATION_DATE, VR::DA, PrimitiveValue::from(date))?;
    put_value(obj, tags::INSTANCE_CREATION_TIME, VR::TM, PrimitiveValue::from(time))?;

    Ok(sop_instance_uid)
}

/// Insert a textual attribute into the object.
///
/// The attribute must be known to the standard data dictionary.
/// A value which does not conform to the value representation
/// is still inserted, with a warning.
/// The previous value of the attribute is replaced.
pub fn put_checked(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: &str) -> Result<()> {
    let elem = checked_element(tag, vr, value)?;
    trace!("{} {:?} [{}]", tag, vr, value);
    obj.put(elem);
    Ok(())
}

/// Insert an attribute with an already typed value into the object.
pub fn put_value(obj: &mut InMemDicomObject, tag: Tag, vr: VR, value: PrimitiveValue) -> Result<()> {
    ensure_known(tag)?;
    trace!("{} {:?} [{}]", tag, vr, value.to_str());
    obj.put(DataElement::new(tag, vr, value));
    Ok(())
}

/// Insert an attribute with an empty value into the object.
pub fn put_empty(obj: &mut InMemDicomObject, tag: Tag, vr: VR) -> Result<()> {
    ensure_known(tag)?;
    trace!("{} {:?} (empty)", tag, vr);
    let elem = if vr == VR::SQ {
        DataElement::new(tag, VR::SQ, DataSetSequence::<InMemDicomObject>::empty())
    } else {
        DataElement::empty(tag, vr)
    };
    obj.put(elem);
    Ok(())
}

/// Insert a code sequence with a single item describing the given concept.
pub fn put_code_sequence(obj: &mut InMemDicomObject, tag: Tag, concept: &ConceptName) -> Result<()> {
    ensure_known(tag)?;
    let item = InMemDicomObject::from_element_iter([
        checked_element(tags::CODE_VALUE, VR::SH, &concept.code_value)?,
        checked_element(
            tags::CODING_SCHEME_DESIGNATOR,
            VR::SH,
            &concept.coding_scheme_designator,
        )?,
        checked_element(tags::CODE_MEANING, VR::LO, &concept.code_meaning)?,
    ]);
    trace!(
        "{} SQ ({}, {}, \"{}\")",
        tag,
        concept.code_value,
        concept.coding_scheme_designator,
        concept.code_meaning
    );
    obj.put(DataElement::new(
        tag,
        VR::SQ,
        DataSetSequence::from(vec![item]),
    ));
    Ok(())
}

/// Check that the attribute is in the standard data dictionary,
/// returning its keyword.
pub fn ensure_known(tag: Tag) -> Result<String> {
    StandardDataDictionary
        .by_tag(tag)
        .map(|entry| entry.alias().to_string())
        .context(UnknownAttributeSnafu { tag })
}

fn checked_element(tag: Tag, vr: VR, value: &str) -> Result<InMemElement> {
    let alias = ensure_known(tag)?;
    if let Err(e) = check_value(vr, value) {
        warn!("{} {}: {}", tag, alias, e);
    }
    Ok(DataElement::new(tag, vr, PrimitiveValue::from(value)))
}

/// Check whether a textual value conforms to the given value representation.
///
/// Dates, integer strings and UIDs are checked,
/// value by value.
/// Empty values and other value representations are always accepted.
pub fn check_value(vr: VR, value: &str) -> Result<(), ValueError> {
    let valid = value.is_empty()
        || value.split('\\').all(|single| match vr {
            VR::DA => single.len() == 8 && parse_date(single.as_bytes()).is_ok(),
            VR::IS => single.trim().parse::<i32>().is_ok(),
            VR::UI => is_valid_uid(single.trim_end_matches('\0')),
            _ => true,
        });
    ensure!(valid, MalformedSnafu { vr, value });
    Ok(())
}
