//! Content-based comparison of two manifests

use crate::hash::ContentHash;
use crate::manifest::Manifest;
use std::collections::HashSet;

/// Paths in `candidate` whose content appears nowhere in `reference`
///
/// Only content matters: a file renamed or copied on one side still matches.
/// The result is sorted by path and does not depend on record order in
/// either manifest.
pub fn missing_from<'c>(reference: &Manifest, candidate: &'c Manifest) -> Vec<&'c str> {
    let known: HashSet<&ContentHash> = reference
        .iter()
        .map(|(_, record)| &record.content_hash)
        .collect();

    candidate
        .iter()
        .filter(|(_, record)| !known.contains(&record.content_hash))
        .map(|(path, _)| path)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::hash_bytes;
    use crate::manifest::{decode, encode, FileRecord, Timestamp};

    fn manifest(entries: &[(&str, &str)]) -> Manifest {
        entries
            .iter()
            .map(|(path, content)| {
                (
                    path.to_string(),
                    FileRecord::new(hash_bytes(content.as_bytes()), Timestamp::default()),
                )
            })
            .collect()
    }

    #[test]
    fn test_reports_unknown_content() {
        let local = manifest(&[("./a", "alpha"), ("./b", "beta")]);
        let remote = manifest(&[("./x", "alpha"), ("./y", "gamma"), ("./z", "delta")]);

        assert_eq!(missing_from(&local, &remote), vec!["./y", "./z"]);
    }

    #[test]
    fn test_everything_present() {
        let local = manifest(&[("./a", "alpha"), ("./b", "beta")]);
        let remote = manifest(&[("./renamed", "beta"), ("./copy1", "alpha"), ("./copy2", "alpha")]);

        assert!(missing_from(&local, &remote).is_empty());
    }

    #[test]
    fn test_shared_hashes_in_reference() {
        let local = manifest(&[("./one", "same"), ("./two", "same")]);
        let remote = manifest(&[("./three", "same"), ("./four", "other")]);

        assert_eq!(missing_from(&local, &remote), vec!["./four"]);
    }

    #[test]
    fn test_empty_manifests() {
        let some = manifest(&[("./a", "alpha")]);
        let empty = Manifest::new();

        assert!(missing_from(&some, &empty).is_empty());
        assert_eq!(missing_from(&empty, &some), vec!["./a"]);
    }

    #[test]
    fn test_record_order_is_irrelevant() {
        let a = "./p\x001.0\x00a9993e364706816aba3e25717850c26c9cd0d89d\x00\x00";
        let b = "./q\x002.0\x00da39a3ee5e6b4b0d3255bfef95601890afd80709\x00\x00";
        let forward = decode(format!("{a}{b}").as_bytes()).unwrap();
        let backward = decode(format!("{b}{a}").as_bytes()).unwrap();
        let reference = manifest(&[("./x", "abc")]);

        assert_eq!(missing_from(&reference, &forward), vec!["./q"]);
        assert_eq!(
            missing_from(&reference, &forward),
            missing_from(&reference, &backward)
        );

        let mut encoded = Vec::new();
        encode(&backward, &mut encoded).unwrap();
        assert_eq!(missing_from(&decode(&encoded).unwrap(), &forward), Vec::<&str>::new());
    }
}
