//! Boundary-tag arithmetic and the free-list link fields embedded in a
//! block's payload.
//!
//! A block looks like:
//!
//! ```text
//!   [ header: i32 ][ payload: N bytes ][ footer: i32 ]
//! ```
//!
//! `header` and `footer` carry `+N` when the block is free and `-N` when
//! it is allocated. A free block's payload begins with two `usize` link
//! fields (`prev`, `next`) that thread it into the arena's free list; a
//! link value of `0` means "no neighbor" (the free list's null terminator).
//!
//! All raw pointer arithmetic for the allocator lives here. Every other
//! module reaches neighboring blocks, the free-list links, and the
//! payload strictly through `BlockCursor`.

use std::mem;
use std::ptr::NonNull;

/// Size of a boundary tag word.
pub(crate) const TAG_SIZE: usize = mem::size_of::<i32>();
/// Size of a single free-list link field.
pub(crate) const PTR_SIZE: usize = mem::size_of::<usize>();
/// Size of the two link fields (`prev` + `next`) a free block's payload
/// must be able to host.
pub(crate) const LINK_SIZE: usize = 2 * PTR_SIZE;

/// A cursor over a single block, positioned at its header byte.
///
/// Copyable and cheap: it is just a validated-at-construction-time raw
/// pointer. Constructing one is `unsafe` (the caller must point it at a
/// real header); every method on it is safe, since the arithmetic it
/// performs cannot go out of bounds of the arena as long as the arena's
/// invariants (I1-I3) hold.
#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) struct BlockCursor {
    header: NonNull<u8>,
}

impl BlockCursor {
    /// # Safety
    /// `header` must point at the first byte of a real block's header tag
    /// within a live arena.
    pub(crate) unsafe fn new(header: *mut u8) -> Self {
        BlockCursor {
            header: unsafe { NonNull::new_unchecked(header) },
        }
    }

    /// # Safety
    /// `payload` must be a pointer previously handed out by this arena's
    /// `allocate`/`reallocate`.
    pub(crate) unsafe fn from_payload(payload: NonNull<u8>) -> Self {
        unsafe { Self::new(payload.as_ptr().sub(TAG_SIZE)) }
    }

    pub(crate) fn header_addr(self) -> usize {
        self.header.as_ptr() as usize
    }

    pub(crate) fn payload_ptr(self) -> NonNull<u8> {
        unsafe { NonNull::new_unchecked(self.header.as_ptr().add(TAG_SIZE)) }
    }

    fn header_tag(self) -> i32 {
        unsafe { self.header.as_ptr().cast::<i32>().read_unaligned() }
    }

    fn footer_ptr(self) -> *mut u8 {
        unsafe { self.header.as_ptr().add(TAG_SIZE + self.payload_size()) }
    }

    fn footer_tag(self) -> i32 {
        unsafe { self.footer_ptr().cast::<i32>().read_unaligned() }
    }

    /// Magnitude of the header tag: the block's payload size in bytes.
    pub(crate) fn payload_size(self) -> usize {
        self.header_tag().unsigned_abs() as usize
    }

    pub(crate) fn is_free(self) -> bool {
        self.header_tag() > 0
    }

    /// Header and footer symmetry (I2): true when both tags agree.
    pub(crate) fn tags_symmetric(self) -> bool {
        self.header_tag() == self.footer_tag()
    }

    /// Writes `signed_size` (positive = free, negative = allocated) to
    /// both the header and footer tag.
    pub(crate) fn set_tags(self, signed_size: i32) {
        unsafe {
            self.header.as_ptr().cast::<i32>().write_unaligned(signed_size);
        }
        unsafe {
            self.footer_ptr().cast::<i32>().write_unaligned(signed_size);
        }
    }

    fn link_slot(self, offset: usize) -> *mut usize {
        unsafe { self.payload_ptr().as_ptr().add(offset).cast::<usize>() }
    }

    /// Only meaningful while the block is free.
    pub(crate) fn prev_link(self) -> Option<BlockCursor> {
        let raw = unsafe { self.link_slot(0).read_unaligned() };
        (raw != 0).then(|| unsafe { BlockCursor::new(raw as *mut u8) })
    }

    /// Only meaningful while the block is free.
    pub(crate) fn next_link(self) -> Option<BlockCursor> {
        let raw = unsafe { self.link_slot(PTR_SIZE).read_unaligned() };
        (raw != 0).then(|| unsafe { BlockCursor::new(raw as *mut u8) })
    }

    pub(crate) fn set_prev_link(self, node: Option<BlockCursor>) {
        let raw = node.map_or(0, BlockCursor::header_addr);
        unsafe { self.link_slot(0).write_unaligned(raw) };
    }

    pub(crate) fn set_next_link(self, node: Option<BlockCursor>) {
        let raw = node.map_or(0, BlockCursor::header_addr);
        unsafe { self.link_slot(PTR_SIZE).write_unaligned(raw) };
    }

    /// The block physically to the left, found by reading the tag word
    /// immediately preceding this block's header (the neighbor's footer).
    /// Returns `None` at the arena's leftmost boundary.
    pub(crate) fn prev_neighbor(self, arena_base: usize) -> Option<BlockCursor> {
        let h = self.header_addr();
        if h == arena_base {
            return None;
        }
        let prev_footer = unsafe { (h - TAG_SIZE) as *mut i32 };
        let prev_size = unsafe { prev_footer.read_unaligned() }.unsigned_abs() as usize;
        let prev_header = h - 2 * TAG_SIZE - prev_size;
        Some(unsafe { BlockCursor::new(prev_header as *mut u8) })
    }

    /// The block physically to the right. Returns `None` at the arena's
    /// rightmost boundary.
    pub(crate) fn next_neighbor(self, arena_end: usize) -> Option<BlockCursor> {
        let next_header = self.header_addr() + 2 * TAG_SIZE + self.payload_size();
        (next_header < arena_end).then(|| unsafe { BlockCursor::new(next_header as *mut u8) })
    }
}

impl std::fmt::Debug for BlockCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockCursor")
            .field("header_addr", &format_args!("{:#x}", self.header_addr()))
            .field("payload_size", &self.payload_size())
            .field("free", &self.is_free())
            .finish()
    }
}
