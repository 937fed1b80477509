//! The static asset catalog: which selection expression pulls in which
//! source files, and how they are staged. Changing the selectable assets
//! means editing this table.

/// How the embed executor treats a converted file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbedKind {
    /// Raw bytes, converted as-is.
    Binary,
    /// Plain text; the prepare/revert hook pair runs around its conversion.
    Text,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageMode {
    /// Copy into the filesystem image staging directory.
    Copy,
    /// Convert to a linkable object and register it as a link input.
    Embed { kind: EmbedKind },
}

#[derive(Debug, Clone)]
pub struct AssetGroup {
    /// Relative to the project root, ending in '/'.
    pub source_dir: String,
    /// File name patterns, expanded with glob semantics.
    pub patterns: Vec<String>,
    /// Leading path segments of `source_dir` dropped from copy destinations.
    pub skip_levels: usize,
}

#[derive(Debug, Clone)]
pub struct CatalogEntry {
    pub condition: String,
    pub mode: StageMode,
    pub groups: Vec<AssetGroup>,
}

const CUSTOM_CLOCK_LEVELS: usize = 10;

/// The built-in catalog. Entries are evaluated independently and in this
/// order; several may be selected at once (a clock level of 5 pulls in the
/// faces for levels 0 through 4).
pub fn builtin_catalog() -> Vec<CatalogEntry> {
    let frames: Vec<String> = (0..12).map(|i| format!("{i}.jpg")).collect();
    let mut catalog = Vec::with_capacity(CUSTOM_CLOCK_LEVELS + 2);

    for level in 0..CUSTOM_CLOCK_LEVELS {
        catalog.push(CatalogEntry {
            condition: format!("USE_CLOCK_CUSTOM > {level}"),
            mode: StageMode::Copy,
            groups: vec![AssetGroup {
                source_dir: format!("images/clock/CustomClock{level}/"),
                patterns: frames.clone(),
                // Staged paths start at "CustomClock<n>/", not "images/clock/".
                skip_levels: 2,
            }],
        });
    }

    for (variant, dir) in [
        ("NIXIE_NOHOLES", "images/clock/nixie.no-holes/"),
        ("NIXIE_HOLES", "images/clock/nixie.holes/"),
    ] {
        catalog.push(CatalogEntry {
            condition: format!("USE_CLOCK_NIXIE == {variant}"),
            mode: StageMode::Embed {
                kind: EmbedKind::Binary,
            },
            groups: vec![AssetGroup {
                source_dir: dir.to_string(),
                patterns: frames.clone(),
                skip_levels: 0,
            }],
        });
    }

    catalog
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_catalog_shape() {
        let catalog = builtin_catalog();
        assert_eq!(catalog.len(), CUSTOM_CLOCK_LEVELS + 2);

        let copies = catalog
            .iter()
            .filter(|e| e.mode == StageMode::Copy)
            .count();
        assert_eq!(copies, CUSTOM_CLOCK_LEVELS);

        for entry in &catalog {
            for group in &entry.groups {
                assert!(group.source_dir.ends_with('/'));
                assert_eq!(group.patterns.len(), 12);
            }
        }

        assert_eq!(catalog[0].condition, "USE_CLOCK_CUSTOM > 0");
        assert_eq!(catalog[0].groups[0].skip_levels, 2);
        assert_eq!(
            catalog[CUSTOM_CLOCK_LEVELS].condition,
            "USE_CLOCK_NIXIE == NIXIE_NOHOLES"
        );
    }
}
