//! Row vacuum: physical removal of logically deleted rows
//!
//! Both routines walk the sorted delete list once and move each surviving
//! run of rows toward the front with a single copy, so the cost is linear in
//! the chunk regardless of how the deletes are distributed.

use crate::storage::{read_index_entry, write_index_entry, INDEX_ENTRY_SIZE};

/// Compact a fixed-width chunk in place.
///
/// `delete_offsets` must be strictly increasing and within
/// `[0, row_count)`. Returns the number of payload bytes kept; the caller
/// truncates the buffer to that size.
pub fn vacuum_fixed_rows(
    data: &mut [u8],
    element_size: usize,
    row_count: usize,
    delete_offsets: &[u64],
) -> usize {
    let mut keep_head = 0usize; // first row of the current surviving run
    let mut fill_head = 0usize; // destination row for the run
    let mut nbytes_kept = 0usize;

    for i in 0..=delete_offsets.len() {
        let is_last = i == delete_offsets.len();
        let row = if is_last {
            row_count
        } else {
            delete_offsets[i] as usize
        };
        let nrows_to_keep = row.saturating_sub(keep_head);
        if nrows_to_keep > 0 {
            let nbytes = nrows_to_keep * element_size;
            if fill_head != keep_head {
                let src = keep_head * element_size;
                data.copy_within(src..src + nbytes, fill_head * element_size);
            }
            fill_head += nrows_to_keep;
            nbytes_kept += nbytes;
        }
        keep_head = row + 1;
    }
    nbytes_kept
}

/// Compact a variable-length chunk: the data buffer and its offset index are
/// rewritten together so that both stay internally consistent.
///
/// Surviving payload bytes are moved down, the moved rows' index entries are
/// rebased onto their new payload position, and the entries themselves are
/// moved down. Returns the number of payload bytes kept. The caller writes
/// the index terminator and truncates both buffers.
pub fn vacuum_varlen_rows(
    data: &mut [u8],
    index: &mut [u8],
    row_count: usize,
    delete_offsets: &[u64],
) -> usize {
    let data_size = data.len();
    let mut keep_head = 0usize;
    let mut fill_head = 0usize;
    let mut nbytes_kept = 0usize;

    for i in 0..=delete_offsets.len() {
        let is_last = i == delete_offsets.len();
        let row = if is_last {
            row_count
        } else {
            delete_offsets[i] as usize
        };
        let nrows_to_keep = row.saturating_sub(keep_head);
        if nrows_to_keep > 0 {
            let run_base = read_index_entry(index, keep_head) as usize;
            let run_end = if is_last {
                data_size
            } else {
                read_index_entry(index, row) as usize
            };
            let nbytes = run_end - run_base;

            if fill_head != keep_head {
                data.copy_within(run_base..run_base + nbytes, nbytes_kept);

                // Rebase the run's entries onto the moved payload, then
                // slide the entries themselves down.
                for k in 0..nrows_to_keep {
                    let old = read_index_entry(index, keep_head + k) as usize;
                    let rebased = nbytes_kept + (old - run_base);
                    write_index_entry(index, keep_head + k, rebased as u32);
                }
                let src = keep_head * INDEX_ENTRY_SIZE;
                let len = nrows_to_keep * INDEX_ENTRY_SIZE;
                index.copy_within(src..src + len, fill_head * INDEX_ENTRY_SIZE);
            }
            nbytes_kept += nbytes;
            fill_head += nrows_to_keep;
        }
        keep_head = row + 1;
    }
    nbytes_kept
}
