// Copyright 2020 The Jujutsu Authors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// https://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Textual patch codec: component A. A thin, deterministic wrapper around
//! `diffy`'s Myers-diff unified patches.
//!
//! `apply` never fails: hunks that no longer match the base are skipped
//! (`diffy::apply_best_effort`), and it is the history tree's job (via the
//! per-node checksum) to detect when that happened. See Design Note 9
//! ("partial patch apply").

use thiserror::Error;

/// One patch taking some `old` string to some `new` string. Opaque; never
/// constructed directly outside this module.
#[derive(Clone, PartialEq, Eq)]
pub struct Patch(String);

impl std::fmt::Debug for Patch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("Patch").field(&self.0).finish()
    }
}

/// Joins multiple patches' wire text into one blob for a single `Patches`
/// field, and splits it back apart. Not itself meaningful patch syntax;
/// purely a serialization boundary between sibling patches in a node's
/// patch list.
const PATCH_SEPARATOR: &str = "\n%%% dotted-patch-boundary %%%\n";

#[derive(Debug, Error)]
pub enum PatchError {
    #[error("malformed patch text: {0}")]
    Malformed(String),
}

/// Computes the patch that takes `old` to `new`. Deterministic and pure;
/// identical inputs yield an empty-but-well-formed patch.
pub fn diff(old: &str, new: &str) -> Patch {
    Patch(diffy::create_patch(old, new).to_string())
}

/// Applies an ordered sequence of patches to `base`, tolerating hunks that
/// fail to apply (they're skipped, leaving the surrounding content as-is).
/// Divergence from the intended result is only detectable by the caller via
/// checksum, per spec.
pub fn apply(patches: &[Patch], base: &str) -> String {
    let mut content = base.to_owned();
    for patch in patches {
        // Patch text was validated at construction (`diff`) or at `from_text`
        // time, so a parse failure here can only mean on-disk corruption;
        // treat it the same as a non-applying hunk rather than panicking.
        content = match diffy::Patch::from_str(&patch.0) {
            Ok(parsed) => diffy::apply_best_effort(&content, &parsed),
            Err(_) => content,
        };
    }
    content
}

/// Serializes an ordered patch sequence (one history node's `patches`
/// field) to its on-disk textual form.
pub fn to_text(patches: &[Patch]) -> String {
    patches
        .iter()
        .map(|patch| patch.0.as_str())
        .collect::<Vec<_>>()
        .join(PATCH_SEPARATOR)
}

/// Parses the textual form written by [`to_text`] back into an ordered
/// patch sequence.
pub fn from_text(text: &str) -> Result<Vec<Patch>, PatchError> {
    if text.is_empty() {
        return Ok(Vec::new());
    }
    text.split(PATCH_SEPARATOR)
        .map(|chunk| {
            diffy::Patch::from_str(chunk)
                .map_err(|err| PatchError::Malformed(err.to_string()))?;
            Ok(Patch(chunk.to_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case("a\n", "a\n" ; "unchanged")]
    #[test_case("a\n", "a\nb\n" ; "trailing line added")]
    #[test_case("a\nb\nc\n", "a\nc\n" ; "middle line removed")]
    #[test_case("no trailing newline", "no trailing newline, extended" ; "no trailing newline")]
    #[test_case("caf\u{e9}\n", "caf\u{e9} au lait\n" ; "non ascii content")]
    fn diff_then_apply_recovers_new_content(old: &str, new: &str) {
        let patch = diff(old, new);
        assert_eq!(apply(&[patch], old), new);
    }

    #[test]
    fn identical_inputs_yield_empty_but_well_formed_patch() {
        let patch = diff("same", "same");
        assert_eq!(apply(&[patch.clone()], "same"), "same");
        // Round-trips through text even though there's nothing to apply.
        let text = to_text(&[patch]);
        let parsed = from_text(&text).unwrap();
        assert_eq!(apply(&parsed, "same"), "same");
    }

    #[test]
    fn sequence_of_patches_composes() {
        let s0 = "a\n";
        let s1 = "a\nb\n";
        let s2 = "a\nb\nc\n";
        let patches = vec![diff(s0, s1), diff(s1, s2)];
        assert_eq!(apply(&patches, s0), s2);
    }

    #[test]
    fn text_roundtrip_preserves_sequence() {
        let patches = vec![diff("x", "xy"), diff("xy", "xyz")];
        let text = to_text(&patches);
        let parsed = from_text(&text).unwrap();
        assert_eq!(apply(&parsed, "x"), "xyz");
    }

    #[test]
    fn empty_patch_list_roundtrips() {
        let text = to_text(&[]);
        assert_eq!(text, "");
        assert_eq!(from_text(&text).unwrap().len(), 0);
    }

    #[test]
    fn malformed_text_is_an_error() {
        assert!(from_text("not a patch at all").is_err());
    }

    #[test]
    fn partial_apply_tolerates_stale_hunks() {
        // Base has diverged from what the patch expects; apply must not
        // panic or error — it's the caller's job to notice via checksum.
        let patch = diff("original\n", "original\nappended\n");
        let diverged_base = "something completely different\n";
        let _ = apply(&[patch], diverged_base);
    }
}
