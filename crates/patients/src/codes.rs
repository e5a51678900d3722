//! Lookup tables for the coded categorical columns of the NFHS-5 extract.

use careplan_core::{ResidenceType, WealthTier};

/// NFHS-5 state/UT names indexed by `code - 1`.
const STATES: [&str; 36] = [
    "Andhra Pradesh",
    "Arunachal Pradesh",
    "Assam",
    "Bihar",
    "Chhattisgarh",
    "Goa",
    "Gujarat",
    "Haryana",
    "Himachal Pradesh",
    "Jharkhand",
    "Karnataka",
    "Kerala",
    "Madhya Pradesh",
    "Maharashtra",
    "Manipur",
    "Meghalaya",
    "Mizoram",
    "Nagaland",
    "Odisha",
    "Punjab",
    "Rajasthan",
    "Sikkim",
    "Tamil Nadu",
    "Telangana",
    "Tripura",
    "Uttar Pradesh",
    "Uttarakhand",
    "West Bengal",
    "Delhi",
    "Jammu & Kashmir",
    "Ladakh",
    "Andaman & Nicobar",
    "Chandigarh",
    "Dadra & Nagar Haveli",
    "Lakshadweep",
    "Puducherry",
];

pub const UNKNOWN: &str = "Unknown";

/// Decode a state code (1..=36). Anything else is "Unknown".
pub fn state_name(code: i64) -> &'static str {
    usize::try_from(code)
        .ok()
        .and_then(|c| c.checked_sub(1))
        .and_then(|i| STATES.get(i))
        .copied()
        .unwrap_or(UNKNOWN)
}

/// Case-insensitive reverse lookup.
pub fn state_code(name: &str) -> Option<i64> {
    STATES
        .iter()
        .position(|s| s.eq_ignore_ascii_case(name.trim()))
        .map(|i| i as i64 + 1)
}

/// All known state names in code order.
pub fn state_names() -> &'static [&'static str] {
    &STATES
}

pub fn residence(code: Option<i64>) -> ResidenceType {
    code.map(ResidenceType::from_code).unwrap_or_default()
}

pub fn wealth(code: Option<i64>) -> WealthTier {
    code.map(WealthTier::from_code).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_table_bounds() {
        assert_eq!(state_name(1), "Andhra Pradesh");
        assert_eq!(state_name(14), "Maharashtra");
        assert_eq!(state_name(36), "Puducherry");
        assert_eq!(state_name(0), UNKNOWN);
        assert_eq!(state_name(37), UNKNOWN);
        assert_eq!(state_name(99), UNKNOWN);
        assert_eq!(state_name(-4), UNKNOWN);
    }

    #[test]
    fn reverse_lookup_is_case_insensitive() {
        assert_eq!(state_code("tamil nadu"), Some(23));
        assert_eq!(state_code("JAMMU & KASHMIR"), Some(30));
        assert_eq!(state_code("Atlantis"), None);
    }

    #[test]
    fn residence_and_wealth_codes() {
        assert_eq!(residence(Some(1)), ResidenceType::Urban);
        assert_eq!(residence(Some(2)), ResidenceType::Rural);
        assert_eq!(residence(Some(3)), ResidenceType::Unknown);
        assert_eq!(residence(None), ResidenceType::Unknown);
        assert_eq!(wealth(Some(5)), WealthTier::Richest);
        assert_eq!(wealth(Some(0)), WealthTier::Unknown);
        assert_eq!(wealth(None), WealthTier::Unknown);
    }
}
