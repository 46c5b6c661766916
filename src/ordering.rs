//! Ordering of archive entry names for validation.
//!
//! Base entries sort before versioned entries, versions sort numerically and
//! within one version an outer class (`p/A.class`) sorts before its nested
//! classes (`p/A$B.class`).

use std::cmp::Ordering;

use crate::error::{JarError, Result};
use crate::names::VERSIONS_DIR;

/// Compares two entry names. Fails when a versioned name has no `/` after
/// its version digits.
pub fn compare_entry_names(a: &str, b: &str) -> Result<Ordering> {
    if a == b {
        return Ok(Ordering::Equal);
    }

    let a_versioned = a.starts_with(VERSIONS_DIR);
    let b_versioned = b.starts_with(VERSIONS_DIR);
    match (a_versioned, b_versioned) {
        (true, false) => return Ok(Ordering::Greater),
        (false, true) => return Ok(Ordering::Less),
        _ => {}
    }

    let mut start = 0;
    if a_versioned {
        start = VERSIONS_DIR.len();
        let a_slash = version_end(a, start)?;
        let b_slash = version_end(b, start)?;
        // shorter version numbers go first
        if a_slash != b_slash {
            return Ok(a_slash.cmp(&b_slash));
        }
    }

    let a_keys = a.as_bytes()[start..].iter().map(|&b| sort_key(b));
    let b_keys = b.as_bytes()[start..].iter().map(|&b| sort_key(b));
    Ok(a_keys.cmp(b_keys))
}

/// Byte order with `.` moved just below `$`, so `A.class` precedes `A$B.class`.
fn sort_key(b: u8) -> u16 {
    if b == b'.' {
        u16::from(b'$') * 2 - 1
    } else {
        u16::from(b) * 2
    }
}

fn version_end(name: &str, start: usize) -> Result<usize> {
    name[start..]
        .find('/')
        .map(|i| start + i)
        .ok_or_else(|| JarError::InvalidArchiveEntry(name.to_string()))
}

/// Sorts names with [`compare_entry_names`]. Every versioned name is checked
/// up front so the sort itself cannot fail half way.
pub fn sort_entry_names<S: AsRef<str>>(names: &mut [S]) -> Result<()> {
    for name in names.iter() {
        let name = name.as_ref();
        if name.starts_with(VERSIONS_DIR) {
            version_end(name, VERSIONS_DIR.len())?;
        }
    }
    names.sort_by(|a, b| {
        compare_entry_names(a.as_ref(), b.as_ref()).unwrap_or(Ordering::Equal)
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base_before_versions_and_versions_numeric() -> Result<()> {
        let mut names = vec![
            "META-INF/versions/10/p/C.class",
            "META-INF/versions/9/p/C.class",
            "p/C.class",
        ];
        sort_entry_names(&mut names)?;
        assert_eq!(
            names,
            vec![
                "p/C.class",
                "META-INF/versions/9/p/C.class",
                "META-INF/versions/10/p/C.class",
            ]
        );
        Ok(())
    }

    #[test]
    fn outer_class_before_nested_class() -> Result<()> {
        assert_eq!(
            compare_entry_names("p/A$B.class", "p/A.class")?,
            Ordering::Greater
        );
        assert_eq!(
            compare_entry_names("META-INF/versions/9/p/A.class", "META-INF/versions/9/p/A$1.class")?,
            Ordering::Less
        );
        Ok(())
    }

    #[test]
    fn order_stays_total_around_dot_and_dollar() -> Result<()> {
        assert_eq!(compare_entry_names("x$", "x-")?, Ordering::Less);
        assert_eq!(compare_entry_names("x.", "x-")?, Ordering::Less);
        assert_eq!(compare_entry_names("x.", "x$")?, Ordering::Less);
        assert_eq!(compare_entry_names("x#", "x.")?, Ordering::Less);

        let mut names = vec!["x-", "x$", "x.", "x#", "x"];
        sort_entry_names(&mut names)?;
        assert_eq!(names, vec!["x", "x#", "x.", "x$", "x-"]);
        Ok(())
    }

    #[test]
    fn same_length_versions_compare_by_digits() -> Result<()> {
        assert_eq!(
            compare_entry_names("META-INF/versions/11/a", "META-INF/versions/10/b")?,
            Ordering::Greater
        );
        Ok(())
    }

    #[test]
    fn missing_version_slash_is_invalid() {
        let err = compare_entry_names("META-INF/versions/9C.class", "META-INF/versions/9/C.class")
            .unwrap_err();
        assert!(matches!(err, JarError::InvalidArchiveEntry(name) if name == "META-INF/versions/9C.class"));

        let mut names = vec!["p/C.class", "META-INF/versions/10C.class"];
        assert!(sort_entry_names(&mut names).is_err());
    }
}
