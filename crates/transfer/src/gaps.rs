//! Resend-list computation.
//!
//! The list names each missing index up to the highest slice the server
//! holds, followed by the first index past it. When more indices follow, the
//! last entry is [`RESEND_TAIL`], meaning "and every index after the previous
//! entry".

use std::collections::BTreeSet;

use crate::RESEND_TAIL;

/// Computes the compact resend list for a transfer of `slice_count` slices
/// given the set of indices already staged.
///
/// Indices at or beyond `slice_count` are ignored.
pub fn find_resend_slices(present: &BTreeSet<u32>, slice_count: u32) -> Vec<i64> {
    let mut remaining: BTreeSet<u32> = present.range(..slice_count).copied().collect();
    let mut resend = Vec::new();

    let mut i = 0u32;
    while i < slice_count && !remaining.is_empty() {
        if !remaining.remove(&i) {
            resend.push(i64::from(i));
        }
        i += 1;
    }

    if i < slice_count {
        resend.push(i64::from(i));
        i += 1;
        if i < slice_count {
            resend.push(RESEND_TAIL);
        }
    }

    resend
}

/// Expands a compact resend list into every index it names.
///
/// A [`RESEND_TAIL`] entry expands to all indices after the preceding entry
/// up to `slice_count`. Entries outside `0..slice_count` are dropped.
pub fn expand_resend_list(list: &[i64], slice_count: u32) -> Vec<u32> {
    let mut out = Vec::new();
    let mut prev: Option<u32> = None;

    for &entry in list {
        if entry == RESEND_TAIL {
            let start = prev.map_or(0, |p| p + 1);
            out.extend(start..slice_count);
            prev = slice_count.checked_sub(1);
            continue;
        }
        let Ok(index) = u32::try_from(entry) else {
            continue;
        };
        if index < slice_count {
            out.push(index);
            prev = Some(index);
        }
    }

    out
}
