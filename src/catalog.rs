//! Static catalog of service categories and office locations.

use crate::models::{Category, CheckTarget, Location};
use crate::utils::error::{AppError, Result};

/// (key, display name, description)
pub const CATEGORIES: &[(&str, &str, &str)] = &[
    (
        "driver_license_first_time",
        "Driver License - First Time",
        "New driver over 18, new N.C. resident, REAL ID",
    ),
    (
        "driver_license_duplicate",
        "Driver License Duplicate",
        "Replace lost or stolen license, change name or address, REAL ID",
    ),
    (
        "driver_license_renewal",
        "Driver License Renewal",
        "Renew an existing license without any changes, REAL ID",
    ),
    (
        "fees",
        "Fees",
        "License reinstatement appointment, administrative hearings, and medical certifications",
    ),
    ("id_card", "ID Card", "State ID card, REAL ID"),
    ("knowledge_computer_test", "Knowledge/Computer Test", "Written, traffic signs, vision"),
    (
        "legal_presence",
        "Legal Presence",
        "For non-citizens to prove they are legally authorized to be in the U.S.",
    ),
    ("motorcycle_skills_test", "Motorcycle Skills Test", "Schedule a motorcycle driving skills test"),
    ("non_cdl_road_test", "Non-CDL Road Test", "Schedule a driving skills test"),
    ("permits", "Permits", "Adult permit, CDL"),
    ("teen_driver_level_1", "Teen Driver Level 1", "Limited learner permit - ages 15-17"),
    (
        "teen_driver_level_2",
        "Teen Driver Level 2",
        "Limited provisional license - ages 16-17; Level 1 permit",
    ),
    (
        "teen_driver_level_3",
        "Teen Driver Level 3",
        "Full provisional license - ages 16-17; Level 2 license",
    ),
];

pub const LOCATIONS: &[&str] = &[
    "Aberdeen", "Ahoskie", "Albemarle", "Andrews", "Asheboro", "Asheville",
    "Boone", "Brevard", "Bryson City", "Burgaw", "Burnsville", "Carrboro",
    "Cary", "Charlotte East", "Charlotte North", "Charlotte South",
    "Charlotte West", "Clayton", "Clinton", "Clyde", "Concord", "Durham East",
    "Durham South", "Elizabeth City", "Elizabethtown", "Elkin", "Erwin",
    "Fayetteville South", "Fayetteville West", "Forest City", "Franklin",
    "Fuquay-Varina", "Garner", "Gastonia", "Goldsboro", "Graham",
    "Greensboro East", "Greensboro West", "Greenville", "Hamlet", "Havelock",
    "Henderson", "Hendersonville", "Hickory", "High Point", "Hillsborough",
    "Hudson", "Huntersville", "Jacksonville", "Jefferson", "Kernersville",
    "Kinston", "Lexington", "Lincolnton", "Louisburg", "Lumberton", "Marion",
    "Marshall", "Mocksville", "Monroe", "Mooresville", "Morehead City",
    "Morganton", "Mount Airy", "Mount Holly", "Nags Head", "New Bern",
    "Newton", "Oxford", "Polkton", "Raleigh North", "Raleigh West",
    "Roanoke Rapids", "Rocky Mount", "Roxboro", "Salisbury", "Sanford",
    "Shallotte", "Shelby", "Siler City", "Smithfield", "Statesville",
    "Stedman", "Sylva", "Tarboro", "Taylorsville", "Thomasville", "Troy",
    "Washington", "Wendell", "Wentworth", "Whiteville", "Wilkesboro",
    "Williamston", "Wilmington North", "Wilmington South", "Wilson",
    "Winston Salem North", "Winston Salem South", "Yadkinville",
];

pub fn all_categories() -> Vec<Category> {
    CATEGORIES
        .iter()
        .map(|(key, name, description)| Category::new(*key, *name, *description))
        .collect()
}

pub fn find_category(key: &str) -> Option<Category> {
    CATEGORIES
        .iter()
        .find(|(k, _, _)| *k == key)
        .map(|(key, name, description)| Category::new(*key, *name, *description))
}

/// Resolves configured category keys; an empty list selects the whole catalog.
pub fn select_categories(keys: &[String]) -> Result<Vec<Category>> {
    if keys.is_empty() {
        return Ok(all_categories());
    }
    keys.iter()
        .map(|key| {
            find_category(key).ok_or_else(|| AppError::Validation(format!("Unknown category key: {}", key)))
        })
        .collect()
}

/// Resolves configured location names; an empty list selects the whole catalog.
pub fn select_locations(names: &[String]) -> Result<Vec<Location>> {
    if names.is_empty() {
        return Ok(LOCATIONS.iter().map(|name| Location::new(*name)).collect());
    }
    names
        .iter()
        .map(|name| {
            LOCATIONS
                .iter()
                .find(|known| known.eq_ignore_ascii_case(name))
                .map(|known| Location::new(*known))
                .ok_or_else(|| AppError::Validation(format!("Unknown location: {}", name)))
        })
        .collect()
}

/// Category-major cross product, the order in which the site is drilled into.
pub fn enumerate_targets(categories: &[Category], locations: &[Location]) -> Vec<CheckTarget> {
    categories
        .iter()
        .flat_map(|category| {
            locations
                .iter()
                .map(move |location| CheckTarget::new(category.clone(), location.clone()))
        })
        .collect()
}
