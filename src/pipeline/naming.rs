//! Output file naming: derived names and archive collision resolution.
//!
//! A converted file keeps its source stem and swaps the source extension for
//! the target one: `IMG_0001.HEIC` → `IMG_0001.jpg`. The match on the source
//! extension is case-insensitive; the replacement is always lowercase.
//!
//! Two different sources can derive the same name (`a.heic` and `a.HEIF`
//! both become `a.jpg`). [`disambiguate`] resolves those before the names
//! reach an archive, so no entry ever overwrites another.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;

static RE_HEIF_EXT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\.(heic|heif)$").unwrap());

/// Derives output names from source names.
#[derive(Debug, Clone)]
pub struct NameDeriver {
    source_ext: Regex,
}

impl Default for NameDeriver {
    fn default() -> Self {
        Self {
            source_ext: RE_HEIF_EXT.clone(),
        }
    }
}

impl NameDeriver {
    /// Match any of `extensions` (without dots, any case).
    ///
    /// Falls back to the HEIC/HEIF pair when `extensions` is empty.
    pub fn new<S: AsRef<str>>(extensions: &[S]) -> Self {
        let alternatives: Vec<String> = extensions
            .iter()
            .map(|e| e.as_ref().trim_start_matches('.'))
            .filter(|e| !e.is_empty())
            .map(regex::escape)
            .collect();
        if alternatives.is_empty() {
            return Self::default();
        }
        let pattern = format!(r"(?i)\.(?:{})$", alternatives.join("|"));
        match Regex::new(&pattern) {
            Ok(source_ext) => Self { source_ext },
            Err(_) => Self::default(),
        }
    }

    /// Replace the source extension with `target_ext`.
    ///
    /// Names without a recognised source extension get `target_ext` appended,
    /// so the output never carries a misleading extension.
    pub fn derive(&self, source_name: &str, target_ext: &str) -> String {
        let replacement = format!(".{target_ext}");
        if self.source_ext.is_match(source_name) {
            self.source_ext
                .replace(source_name, replacement.as_str())
                .into_owned()
        } else {
            format!("{source_name}{replacement}")
        }
    }
}

/// Derive with the default HEIC/HEIF extension set.
pub fn derive_name(source_name: &str, target_ext: &str) -> String {
    NameDeriver::default().derive(source_name, target_ext)
}

/// Make every name unique (case-insensitively) while keeping order.
///
/// The first occurrence of a name keeps it; later duplicates become
/// `stem (2).ext`, `stem (3).ext`, … skipping any name already present in
/// the input.
pub fn disambiguate(names: &[String]) -> Vec<String> {
    let mut taken: HashSet<String> = names.iter().map(|n| n.to_lowercase()).collect();
    let mut seen: HashSet<String> = HashSet::with_capacity(names.len());
    let mut out = Vec::with_capacity(names.len());

    for name in names {
        let key = name.to_lowercase();
        if seen.insert(key) {
            out.push(name.clone());
            continue;
        }

        let (stem, ext) = split_extension(name);
        let mut n = 2usize;
        let candidate = loop {
            let c = match ext {
                Some(ext) => format!("{stem} ({n}).{ext}"),
                None => format!("{stem} ({n})"),
            };
            if !taken.contains(&c.to_lowercase()) {
                break c;
            }
            n += 1;
        };
        taken.insert(candidate.to_lowercase());
        seen.insert(candidate.to_lowercase());
        out.push(candidate);
    }

    out
}

fn split_extension(name: &str) -> (&str, Option<&str>) {
    match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem, Some(ext)),
        _ => (name, None),
    }
}
