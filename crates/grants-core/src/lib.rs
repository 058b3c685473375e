//! Core domain model for the Grants.gov daily extract: opportunity records,
//! their field catalogue, and extract file naming.

use std::fmt;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

pub const CRATE_NAME: &str = "grants-core";

/// XML namespace of the `OpportunityDetail-V1.0` extract schema.
pub const OPPORTUNITY_NAMESPACE: &str = "http://apply.grants.gov/system/OpportunityDetail-V1.0";

/// Repeated element holding one opportunity synopsis.
pub const OPPORTUNITY_ELEMENT: &str = "OpportunitySynopsisDetail_1_0";

/// Number of fields carried by every opportunity record.
pub const FIELD_COUNT: usize = 26;

const EXTRACT_FILE_PREFIX: &str = "GrantsDBExtract";
const EXTRACT_FILE_SUFFIX: &str = "v2";

/// One column of the opportunity table, in output column order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpportunityField {
    OpportunityId,
    OpportunityTitle,
    OpportunityNumber,
    OpportunityCategory,
    FundingInstrumentType,
    CategoryOfFundingActivity,
    CategoryExplanation,
    CfdaNumbers,
    EligibleApplicants,
    AdditionalInformationOnEligibility,
    AgencyCode,
    AgencyName,
    PostDate,
    CloseDate,
    LastUpdatedDate,
    AwardCeiling,
    AwardFloor,
    EstimatedTotalProgramFunding,
    ExpectedNumberOfAwards,
    Description,
    CostSharingOrMatchingRequirement,
    ArchiveDate,
    GrantorContactEmail,
    GrantorContactEmailDescription,
    GrantorContactText,
    Version,
}

impl OpportunityField {
    pub const ALL: [OpportunityField; FIELD_COUNT] = [
        Self::OpportunityId,
        Self::OpportunityTitle,
        Self::OpportunityNumber,
        Self::OpportunityCategory,
        Self::FundingInstrumentType,
        Self::CategoryOfFundingActivity,
        Self::CategoryExplanation,
        Self::CfdaNumbers,
        Self::EligibleApplicants,
        Self::AdditionalInformationOnEligibility,
        Self::AgencyCode,
        Self::AgencyName,
        Self::PostDate,
        Self::CloseDate,
        Self::LastUpdatedDate,
        Self::AwardCeiling,
        Self::AwardFloor,
        Self::EstimatedTotalProgramFunding,
        Self::ExpectedNumberOfAwards,
        Self::Description,
        Self::CostSharingOrMatchingRequirement,
        Self::ArchiveDate,
        Self::GrantorContactEmail,
        Self::GrantorContactEmailDescription,
        Self::GrantorContactText,
        Self::Version,
    ];

    /// Local name of the child element under `OpportunitySynopsisDetail_1_0`.
    pub fn xml_name(self) -> &'static str {
        match self {
            Self::OpportunityId => "OpportunityID",
            Self::OpportunityTitle => "OpportunityTitle",
            Self::OpportunityNumber => "OpportunityNumber",
            Self::OpportunityCategory => "OpportunityCategory",
            Self::FundingInstrumentType => "FundingInstrumentType",
            Self::CategoryOfFundingActivity => "CategoryOfFundingActivity",
            Self::CategoryExplanation => "CategoryExplanation",
            Self::CfdaNumbers => "CFDANumbers",
            Self::EligibleApplicants => "EligibleApplicants",
            Self::AdditionalInformationOnEligibility => "AdditionalInformationOnEligibility",
            Self::AgencyCode => "AgencyCode",
            Self::AgencyName => "AgencyName",
            Self::PostDate => "PostDate",
            Self::CloseDate => "CloseDate",
            Self::LastUpdatedDate => "LastUpdatedDate",
            Self::AwardCeiling => "AwardCeiling",
            Self::AwardFloor => "AwardFloor",
            Self::EstimatedTotalProgramFunding => "EstimatedTotalProgramFunding",
            Self::ExpectedNumberOfAwards => "ExpectedNumberOfAwards",
            Self::Description => "Description",
            Self::CostSharingOrMatchingRequirement => "CostSharingOrMatchingRequirement",
            Self::ArchiveDate => "ArchiveDate",
            Self::GrantorContactEmail => "GrantorContactEmail",
            Self::GrantorContactEmailDescription => "GrantorContactEmailDescription",
            Self::GrantorContactText => "GrantorContactText",
            Self::Version => "Version",
        }
    }

    /// Human-readable column header used in the CSV output.
    pub fn column_name(self) -> &'static str {
        match self {
            Self::OpportunityId => "Opportunity ID",
            Self::OpportunityTitle => "Opportunity Title",
            Self::OpportunityNumber => "Opportunity Number",
            Self::OpportunityCategory => "Opportunity Category",
            Self::FundingInstrumentType => "Funding Instrument Type",
            Self::CategoryOfFundingActivity => "Category of Funding Activity",
            Self::CategoryExplanation => "Category Explanation",
            Self::CfdaNumbers => "CFDA Number(s)",
            Self::EligibleApplicants => "Eligible Applicants",
            Self::AdditionalInformationOnEligibility => "Additional Information on Eligibility",
            Self::AgencyCode => "Agency Code",
            Self::AgencyName => "Agency Name",
            Self::PostDate => "Post Date",
            Self::CloseDate => "Close Date",
            Self::LastUpdatedDate => "Last Updated Date",
            Self::AwardCeiling => "Award Ceiling",
            Self::AwardFloor => "Award Floor",
            Self::EstimatedTotalProgramFunding => "Estimated Total Program Funding",
            Self::ExpectedNumberOfAwards => "Expected Number of Awards",
            Self::Description => "Description",
            Self::CostSharingOrMatchingRequirement => "Cost Sharing or Matching Requirement",
            Self::ArchiveDate => "Archive Date",
            Self::GrantorContactEmail => "Grantor Contact Email",
            Self::GrantorContactEmailDescription => "Grantor Contact Email Description",
            Self::GrantorContactText => "Grantor Contact Text",
            Self::Version => "Version",
        }
    }

    pub fn from_xml_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|field| field.xml_name() == name)
    }

    pub fn index(self) -> usize {
        self as usize
    }
}

impl fmt::Display for OpportunityField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.column_name())
    }
}

/// A single funding opportunity as listed in the extract.
///
/// Every field is kept as the raw string from the document; fields missing
/// from the source element are empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpportunityRecord {
    pub opportunity_id: String,
    pub opportunity_title: String,
    pub opportunity_number: String,
    pub opportunity_category: String,
    pub funding_instrument_type: String,
    pub category_of_funding_activity: String,
    pub category_explanation: String,
    pub cfda_numbers: String,
    pub eligible_applicants: String,
    pub additional_information_on_eligibility: String,
    pub agency_code: String,
    pub agency_name: String,
    pub post_date: String,
    pub close_date: String,
    pub last_updated_date: String,
    pub award_ceiling: String,
    pub award_floor: String,
    pub estimated_total_program_funding: String,
    pub expected_number_of_awards: String,
    pub description: String,
    pub cost_sharing_or_matching_requirement: String,
    pub archive_date: String,
    pub grantor_contact_email: String,
    pub grantor_contact_email_description: String,
    pub grantor_contact_text: String,
    pub version: String,
}

impl OpportunityRecord {
    /// Build a record from an optional lookup, substituting the empty string
    /// for every field the lookup does not know.
    pub fn from_lookup<F>(mut lookup: F) -> Self
    where
        F: FnMut(OpportunityField) -> Option<String>,
    {
        let mut record = Self::default();
        for field in OpportunityField::ALL {
            *record.field_mut(field) = lookup(field).unwrap_or_default();
        }
        record
    }

    pub fn value(&self, field: OpportunityField) -> &str {
        match field {
            OpportunityField::OpportunityId => &self.opportunity_id,
            OpportunityField::OpportunityTitle => &self.opportunity_title,
            OpportunityField::OpportunityNumber => &self.opportunity_number,
            OpportunityField::OpportunityCategory => &self.opportunity_category,
            OpportunityField::FundingInstrumentType => &self.funding_instrument_type,
            OpportunityField::CategoryOfFundingActivity => &self.category_of_funding_activity,
            OpportunityField::CategoryExplanation => &self.category_explanation,
            OpportunityField::CfdaNumbers => &self.cfda_numbers,
            OpportunityField::EligibleApplicants => &self.eligible_applicants,
            OpportunityField::AdditionalInformationOnEligibility => {
                &self.additional_information_on_eligibility
            }
            OpportunityField::AgencyCode => &self.agency_code,
            OpportunityField::AgencyName => &self.agency_name,
            OpportunityField::PostDate => &self.post_date,
            OpportunityField::CloseDate => &self.close_date,
            OpportunityField::LastUpdatedDate => &self.last_updated_date,
            OpportunityField::AwardCeiling => &self.award_ceiling,
            OpportunityField::AwardFloor => &self.award_floor,
            OpportunityField::EstimatedTotalProgramFunding => &self.estimated_total_program_funding,
            OpportunityField::ExpectedNumberOfAwards => &self.expected_number_of_awards,
            OpportunityField::Description => &self.description,
            OpportunityField::CostSharingOrMatchingRequirement => {
                &self.cost_sharing_or_matching_requirement
            }
            OpportunityField::ArchiveDate => &self.archive_date,
            OpportunityField::GrantorContactEmail => &self.grantor_contact_email,
            OpportunityField::GrantorContactEmailDescription => {
                &self.grantor_contact_email_description
            }
            OpportunityField::GrantorContactText => &self.grantor_contact_text,
            OpportunityField::Version => &self.version,
        }
    }

    pub fn field_mut(&mut self, field: OpportunityField) -> &mut String {
        match field {
            OpportunityField::OpportunityId => &mut self.opportunity_id,
            OpportunityField::OpportunityTitle => &mut self.opportunity_title,
            OpportunityField::OpportunityNumber => &mut self.opportunity_number,
            OpportunityField::OpportunityCategory => &mut self.opportunity_category,
            OpportunityField::FundingInstrumentType => &mut self.funding_instrument_type,
            OpportunityField::CategoryOfFundingActivity => &mut self.category_of_funding_activity,
            OpportunityField::CategoryExplanation => &mut self.category_explanation,
            OpportunityField::CfdaNumbers => &mut self.cfda_numbers,
            OpportunityField::EligibleApplicants => &mut self.eligible_applicants,
            OpportunityField::AdditionalInformationOnEligibility => {
                &mut self.additional_information_on_eligibility
            }
            OpportunityField::AgencyCode => &mut self.agency_code,
            OpportunityField::AgencyName => &mut self.agency_name,
            OpportunityField::PostDate => &mut self.post_date,
            OpportunityField::CloseDate => &mut self.close_date,
            OpportunityField::LastUpdatedDate => &mut self.last_updated_date,
            OpportunityField::AwardCeiling => &mut self.award_ceiling,
            OpportunityField::AwardFloor => &mut self.award_floor,
            OpportunityField::EstimatedTotalProgramFunding => {
                &mut self.estimated_total_program_funding
            }
            OpportunityField::ExpectedNumberOfAwards => &mut self.expected_number_of_awards,
            OpportunityField::Description => &mut self.description,
            OpportunityField::CostSharingOrMatchingRequirement => {
                &mut self.cost_sharing_or_matching_requirement
            }
            OpportunityField::ArchiveDate => &mut self.archive_date,
            OpportunityField::GrantorContactEmail => &mut self.grantor_contact_email,
            OpportunityField::GrantorContactEmailDescription => {
                &mut self.grantor_contact_email_description
            }
            OpportunityField::GrantorContactText => &mut self.grantor_contact_text,
            OpportunityField::Version => &mut self.version,
        }
    }
}

/// File naming for one day's extract: `GrantsDBExtract<YYYYMMDD>v2.{zip,xml,csv}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractName {
    pub date: NaiveDate,
}

impl ExtractName {
    pub fn for_date(date: NaiveDate) -> Self {
        Self { date }
    }

    pub fn stem(&self) -> String {
        format!(
            "{EXTRACT_FILE_PREFIX}{}{EXTRACT_FILE_SUFFIX}",
            self.date.format("%Y%m%d")
        )
    }

    pub fn zip_file_name(&self) -> String {
        format!("{}.zip", self.stem())
    }

    pub fn xml_file_name(&self) -> String {
        format!("{}.xml", self.stem())
    }

    pub fn csv_file_name(&self) -> String {
        format!("{}.csv", self.stem())
    }

    /// Download URL: the base endpoint with the archive name appended verbatim.
    pub fn download_url(&self, base_url: &str) -> String {
        format!("{base_url}{}", self.zip_file_name())
    }
}
