use std::path::{Path, PathBuf};

use crate::catalog::{AssetGroup, CatalogEntry, StageMode};
use crate::defines::MacroStore;
use crate::error::Result;
use crate::expr;

/// One file to stage: the resolved source and where it ends up.
///
/// Copy-mode destinations are relative to the filesystem staging root
/// (source dir with `skip_levels` leading segments dropped, plus the file
/// name). Embed-mode destinations are the original project-relative path
/// behind a `../` prefix, which is the path the enclosing build tool
/// registers for the conversion step.
#[derive(Debug, Clone, PartialEq)]
pub struct StagingItem {
    pub source: PathBuf,
    pub dest: PathBuf,
    pub mode: StageMode,
}

/// Builds the ordered staging plan for one build invocation.
///
/// Every catalog entry is evaluated independently; all selected entries
/// contribute, in catalog order, then group order, then glob match order.
/// A condition that fails to evaluate is a warning and counts as false.
/// A pattern with zero matches contributes nothing.
pub fn plan(catalog: &[CatalogEntry], store: &MacroStore, root: &Path) -> Result<Vec<StagingItem>> {
    let mut items = Vec::new();
    for entry in catalog {
        let selected = match expr::evaluate(&entry.condition, store) {
            Ok(b) => b,
            Err(e) => {
                println!(
                    "WARN: condition '{}' failed to evaluate: {e}",
                    entry.condition
                );
                false
            }
        };
        if !selected {
            continue;
        }
        for group in &entry.groups {
            expand_group(entry.mode, group, root, &mut items)?;
        }
    }
    Ok(items)
}

fn expand_group(
    mode: StageMode,
    group: &AssetGroup,
    root: &Path,
    items: &mut Vec<StagingItem>,
) -> Result<()> {
    for pattern in &group.patterns {
        let full = root.join(&group.source_dir).join(pattern);
        let full = full.to_string_lossy().into_owned();
        for matched in glob::glob(&full)? {
            let source = match matched {
                Ok(p) => p,
                Err(e) => {
                    println!("WARN: skipping unreadable glob match: {e}");
                    continue;
                }
            };
            let dest = match mode {
                StageMode::Copy => copy_dest(group, &source),
                StageMode::Embed { .. } => embed_dest(root, &source),
            };
            items.push(StagingItem { source, dest, mode });
        }
    }
    Ok(())
}

fn copy_dest(group: &AssetGroup, source: &Path) -> PathBuf {
    let stripped = strip_levels(&group.source_dir, group.skip_levels);
    let name = source.file_name().unwrap_or_default();
    if stripped.is_empty() {
        PathBuf::from(name)
    } else {
        PathBuf::from(stripped).join(name)
    }
}

fn embed_dest(root: &Path, source: &Path) -> PathBuf {
    let rel = source.strip_prefix(root).unwrap_or(source);
    Path::new("..").join(rel)
}

// Drops the first `skip` '/'-separated segments of a source directory,
// keeping whatever remains (possibly empty).
pub fn strip_levels(dir: &str, skip: usize) -> String {
    dir.split('/')
        .filter(|s| !s.is_empty())
        .skip(skip)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::EmbedKind;
    use crate::defines::MacroValue;
    use std::fs;
    use tempfile::tempdir;

    fn touch_frames(root: &Path, dir: &str, count: usize) {
        let dir = root.join(dir);
        fs::create_dir_all(&dir).unwrap();
        for i in 0..count {
            fs::write(dir.join(format!("{i}.jpg")), b"jpg").unwrap();
        }
    }

    fn copy_entry(condition: &str, dir: &str, skip: usize) -> CatalogEntry {
        CatalogEntry {
            condition: condition.into(),
            mode: StageMode::Copy,
            groups: vec![AssetGroup {
                source_dir: dir.into(),
                patterns: vec!["*.jpg".into()],
                skip_levels: skip,
            }],
        }
    }

    #[test]
    fn strip_levels_drops_leading_segments() {
        assert_eq!(strip_levels("images/clock/CustomClock0/", 2), "CustomClock0");
        assert_eq!(strip_levels("images/clock/CustomClock0/", 0), "images/clock/CustomClock0");
        assert_eq!(strip_levels("images/clock/CustomClock0/", 5), "");
    }

    #[test]
    fn multiple_entries_contribute_in_catalog_order() {
        let temp = tempdir().unwrap();
        touch_frames(temp.path(), "images/clock/CustomClock0", 2);
        touch_frames(temp.path(), "images/clock/CustomClock1", 2);

        let catalog = vec![
            copy_entry("USE_CLOCK_CUSTOM > 0", "images/clock/CustomClock0/", 2),
            copy_entry("USE_CLOCK_CUSTOM > 1", "images/clock/CustomClock1/", 2),
            copy_entry("USE_CLOCK_CUSTOM > 2", "images/clock/CustomClock2/", 2),
        ];
        let store = MacroStore::from([("USE_CLOCK_CUSTOM", MacroValue::Int(2))]);

        let items = plan(&catalog, &store, temp.path()).unwrap();
        assert_eq!(items.len(), 4);
        assert_eq!(items[0].dest, Path::new("CustomClock0/0.jpg"));
        assert_eq!(items[1].dest, Path::new("CustomClock0/1.jpg"));
        assert_eq!(items[2].dest, Path::new("CustomClock1/0.jpg"));
        assert_eq!(items[3].dest, Path::new("CustomClock1/1.jpg"));
    }

    #[test]
    fn zero_matches_and_failed_conditions_contribute_nothing() {
        let temp = tempdir().unwrap();

        let catalog = vec![
            copy_entry("USE_CLOCK_CUSTOM > 0", "images/clock/CustomClock0/", 2),
            // Malformed on purpose; must degrade to false, not abort.
            copy_entry("((", "images/clock/CustomClock0/", 2),
        ];
        let store = MacroStore::from([("USE_CLOCK_CUSTOM", MacroValue::Int(1))]);

        let items = plan(&catalog, &store, temp.path()).unwrap();
        assert!(items.is_empty());
    }

    #[test]
    fn embed_destinations_keep_the_parent_prefixed_path() {
        let temp = tempdir().unwrap();
        touch_frames(temp.path(), "images/clock/nixie.holes", 1);

        let catalog = vec![CatalogEntry {
            condition: "USE_CLOCK_NIXIE == 1".into(),
            mode: StageMode::Embed {
                kind: EmbedKind::Binary,
            },
            groups: vec![AssetGroup {
                source_dir: "images/clock/nixie.holes/".into(),
                patterns: vec!["0.jpg".into()],
                skip_levels: 0,
            }],
        }];
        let store = MacroStore::from([("USE_CLOCK_NIXIE", MacroValue::Int(1))]);

        let items = plan(&catalog, &store, temp.path()).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].dest, Path::new("../images/clock/nixie.holes/0.jpg"));
        assert!(items[0].source.ends_with("images/clock/nixie.holes/0.jpg"));
    }
}
