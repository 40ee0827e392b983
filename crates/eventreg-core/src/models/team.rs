use serde::{Deserialize, Serialize};

/// One member slot on the team registration form.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
pub struct TeamMember {
    pub name: String,
    pub email: String,
    pub phone: String,
    pub university_name: String,
    #[serde(rename = "university_roll_no")]
    pub roll_number: String,
    pub batch: String,
}

impl TeamMember {
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            ..Default::default()
        }
    }

    /// A member counts toward the team only once name and email are present.
    pub fn is_filled(&self) -> bool {
        !self.name.trim().is_empty() && !self.email.trim().is_empty()
    }

    /// Copy with surrounding whitespace stripped from every field.
    pub fn trimmed(&self) -> Self {
        Self {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            phone: self.phone.trim().to_string(),
            university_name: self.university_name.trim().to_string(),
            roll_number: self.roll_number.trim().to_string(),
            batch: self.batch.trim().to_string(),
        }
    }

    pub fn field(&self, field: MemberField) -> &str {
        match field {
            MemberField::Name => &self.name,
            MemberField::Email => &self.email,
            MemberField::Phone => &self.phone,
            MemberField::UniversityName => &self.university_name,
            MemberField::RollNumber => &self.roll_number,
            MemberField::Batch => &self.batch,
        }
    }

    pub fn field_mut(&mut self, field: MemberField) -> &mut String {
        match field {
            MemberField::Name => &mut self.name,
            MemberField::Email => &mut self.email,
            MemberField::Phone => &mut self.phone,
            MemberField::UniversityName => &mut self.university_name,
            MemberField::RollNumber => &mut self.roll_number,
            MemberField::Batch => &mut self.batch,
        }
    }
}

/// Which field of a member slot an edit targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemberField {
    Name,
    Email,
    Phone,
    UniversityName,
    RollNumber,
    Batch,
}

impl MemberField {
    pub const ALL: [MemberField; 6] = [
        MemberField::Name,
        MemberField::Email,
        MemberField::Phone,
        MemberField::UniversityName,
        MemberField::RollNumber,
        MemberField::Batch,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            MemberField::Name => "Full name",
            MemberField::Email => "Email",
            MemberField::Phone => "Phone",
            MemberField::UniversityName => "University",
            MemberField::RollNumber => "Roll number",
            MemberField::Batch => "Batch",
        }
    }
}
