//! Index-of-refraction table for named materials.
//!
//! Values are the real part of the refractive index at roughly 589 nm
//! (sodium D line). Metals are listed with their real part only, which is
//! all the scene compiler stores per material node.
//!
//! Lookup is case-insensitive and ignores surrounding whitespace:
//!
//! ```
//! assert_eq!(known_ior::lookup("Water").unwrap(), 1.333);
//! assert!(known_ior::lookup("unobtainium").is_err());
//! ```

use std::fmt;

/// IOR of vacuum, the implicit exterior medium.
pub const VACUUM: f32 = 1.0;

/// IOR used when a dielectric names no interior medium.
pub const GLASS: f32 = 1.5;

/// IOR used when a dielectric names no exterior medium.
pub const AIR: f32 = 1.000277;

const TABLE: &[(&str, f32)] = &[
    // Gases
    ("vacuum", VACUUM),
    ("helium", 1.000036),
    ("hydrogen", 1.000132),
    ("air", AIR),
    ("carbon dioxide", 1.00045),
    // Liquids
    ("water", 1.333),
    ("acetone", 1.36),
    ("ethanol", 1.361),
    ("carbon tetrachloride", 1.461),
    ("glycerol", 1.4729),
    ("benzene", 1.501),
    ("silicone oil", 1.52045),
    ("bromine", 1.661),
    // Solids
    ("water ice", 1.31),
    ("fused quartz", 1.458),
    ("pyrex", 1.47),
    ("acrylic glass", 1.49),
    ("polypropylene", 1.49),
    ("glass", GLASS),
    ("bk7", 1.5046),
    ("sodium chloride", 1.544),
    ("amber", 1.55),
    ("pet", 1.575),
    ("sapphire", 1.77),
    ("diamond", 2.419),
    // Metals
    ("silver", 0.135),
    ("gold", 0.47),
    ("copper", 0.637),
    ("aluminium", 1.44),
    ("aluminum", 1.44),
    ("platinum", 2.33),
    ("iron", 2.95),
    ("chromium", 3.18),
];

/// Error returned when a name is not in the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownIor {
    pub name: String,
}

impl fmt::Display for UnknownIor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "material not found: {}", self.name)
    }
}

impl std::error::Error for UnknownIor {}

/// Look up the IOR of a known material by name (case-insensitive).
pub fn lookup(name: &str) -> Result<f32, UnknownIor> {
    let key = name.trim();
    TABLE
        .iter()
        .find(|(entry, _)| entry.eq_ignore_ascii_case(key))
        .map(|&(_, ior)| ior)
        .ok_or_else(|| UnknownIor { name: name.to_string() })
}

/// Iterate over every known material name and its IOR.
pub fn entries() -> impl Iterator<Item = (&'static str, f32)> {
    TABLE.iter().copied()
}
