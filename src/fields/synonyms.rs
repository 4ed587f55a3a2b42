//! Label-synonym table for matching context values to visible fields.
//!
//! New field kinds are rows here, not code changes. Synonyms are tried in
//! order; the first label the page accepts wins.

/// Ordered label synonyms per normalized context key.
pub static FIELD_SYNONYMS: &[(&str, &[&str])] = &[
    ("first_name", &["first name", "given name"]),
    ("last_name", &["last name", "surname", "family name"]),
    ("full_name", &["full name", "name"]),
    ("email", &["email", "e-mail", "email address"]),
    ("phone", &["phone", "phone number", "mobile number"]),
    (
        "confirmation_number",
        &[
            "confirmation number",
            "confirmation code",
            "booking reference",
            "record locator",
        ],
    ),
    ("zip", &["zip", "zip code", "postal code"]),
    ("date_of_birth", &["date of birth", "birth date", "dob"]),
    ("company", &["company", "organization", "employer"]),
];

/// Label fragments that suggest the field expects a numeric identifier.
/// A purely non-numeric value is never applied to these.
pub static NUMERIC_LABEL_HINTS: &[&str] = &[
    "confirmation",
    "phone",
    "mobile",
    "zip",
    "postal",
    "date of birth",
    "dob",
    "ssn",
    "social security",
];

/// Look up the synonym list for a context key.
pub fn synonyms_for(key: &str) -> Option<&'static [&'static str]> {
    FIELD_SYNONYMS
        .iter()
        .find(|(k, _)| *k == key)
        .map(|(_, labels)| *labels)
}
