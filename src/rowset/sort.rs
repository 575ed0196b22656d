//! Sorting of flat record buffers
//!
//! Records are swapped in place inside the byte buffer; only the key column
//! of each record takes part in comparisons.

use std::cmp::Ordering;
use std::ops::Range;

use crate::order::ByteOrder;

/// Ranges below this size are finished with insertion sort
pub(crate) const ISORT_LIMIT: usize = 20;

/// Where the sort key sits in each record
pub(crate) struct KeyLayout<'a> {
    pub width: usize,
    pub key: Range<usize>,
    pub order: &'a ByteOrder,
}

impl KeyLayout<'_> {
    #[inline]
    fn key<'b>(&self, buf: &'b [u8], i: usize) -> &'b [u8] {
        let start = i * self.width;
        &buf[start + self.key.start..start + self.key.end]
    }

    #[inline]
    fn compare(&self, buf: &[u8], i: usize, j: usize) -> Ordering {
        self.order.compare(self.key(buf, i), self.key(buf, j))
    }
}

#[inline]
fn swap(buf: &mut [u8], width: usize, i: usize, j: usize) {
    if i == j {
        return;
    }
    let (lo, hi) = if i < j { (i, j) } else { (j, i) };
    let (head, tail) = buf.split_at_mut(hi * width);
    head[lo * width..(lo + 1) * width].swap_with_slice(&mut tail[..width]);
}

/// Sort records `[lo, hi)`: three-way partitioning quicksort with an
/// insertion-sort finish for small ranges.
pub(crate) fn quicksort(buf: &mut [u8], keys: &KeyLayout<'_>, lo: usize, hi: usize) {
    let mut pivot = Vec::with_capacity(keys.key.len());
    let mut stack = vec![(lo, hi)];

    while let Some((mut lo, mut hi)) = stack.pop() {
        while hi - lo >= ISORT_LIMIT {
            let (lt, gt) = partition3(buf, keys, lo, hi, &mut pivot);
            // Recurse into the smaller side later, keep looping on the larger
            if lt - lo < hi - gt {
                stack.push((lo, lt));
                lo = gt;
            } else {
                stack.push((gt, hi));
                hi = lt;
            }
        }
        insertion_sort(buf, keys, lo, hi);
    }
}

/// Dijkstra partition around a median-of-three pivot.
/// Afterwards `[lo, lt) < pivot`, `[lt, gt) == pivot`, `[gt, hi) > pivot`.
fn partition3(
    buf: &mut [u8],
    keys: &KeyLayout<'_>,
    lo: usize,
    hi: usize,
    pivot: &mut Vec<u8>,
) -> (usize, usize) {
    let mid = lo + (hi - lo) / 2;
    let median = median_of_three(buf, keys, lo, mid, hi - 1);
    pivot.clear();
    pivot.extend_from_slice(keys.key(buf, median));

    let (mut lt, mut i, mut gt) = (lo, lo, hi);
    while i < gt {
        match keys.order.compare(keys.key(buf, i), pivot) {
            Ordering::Less => {
                swap(buf, keys.width, lt, i);
                lt += 1;
                i += 1;
            }
            Ordering::Greater => {
                gt -= 1;
                swap(buf, keys.width, i, gt);
            }
            Ordering::Equal => i += 1,
        }
    }
    (lt, gt)
}

fn median_of_three(buf: &[u8], keys: &KeyLayout<'_>, a: usize, b: usize, c: usize) -> usize {
    let ab = keys.compare(buf, a, b);
    let bc = keys.compare(buf, b, c);
    let ac = keys.compare(buf, a, c);
    match (ab, bc, ac) {
        (Ordering::Less, Ordering::Less, _) | (Ordering::Greater, Ordering::Greater, _) => b,
        (Ordering::Less, _, Ordering::Less) | (Ordering::Greater, _, Ordering::Greater) => c,
        _ => a,
    }
}

fn insertion_sort(buf: &mut [u8], keys: &KeyLayout<'_>, lo: usize, hi: usize) {
    for i in lo + 1..hi {
        let mut j = i;
        while j > lo && keys.compare(buf, j - 1, j) == Ordering::Greater {
            swap(buf, keys.width, j - 1, j);
            j -= 1;
        }
    }
}

/// Merge the sorted runs `[0, mid)` and `[mid, end)` into one sorted run.
/// On equal keys the record from the first run comes first.
pub(crate) fn merge_runs(buf: &mut [u8], keys: &KeyLayout<'_>, mid: usize, end: usize) {
    if mid == 0 || mid >= end || keys.compare(buf, mid - 1, mid) != Ordering::Greater {
        return;
    }
    let width = keys.width;
    let mut merged = Vec::with_capacity(end * width);
    let (mut i, mut j) = (0, mid);
    while i < mid && j < end {
        if keys.compare(buf, i, j) != Ordering::Greater {
            merged.extend_from_slice(&buf[i * width..(i + 1) * width]);
            i += 1;
        } else {
            merged.extend_from_slice(&buf[j * width..(j + 1) * width]);
            j += 1;
        }
    }
    merged.extend_from_slice(&buf[i * width..mid * width]);
    merged.extend_from_slice(&buf[j * width..end * width]);
    buf[..end * width].copy_from_slice(&merged);
}
