//! # tagheap - A Boundary-Tag Arena Allocator
//!
//! This crate provides a single-arena heap allocator that manages a fixed,
//! contiguous byte region using explicit boundary tags, in the style of the
//! classic K&R / CS:APP implicit-list allocator extended with an explicit
//! free list.
//!
//! ## Overview
//!
//! ```text
//!   Arena layout:
//!
//!   ┌──────────────────────────────────────────────────────────────────┐
//!   │                           ARENA (N bytes)                        │
//!   │                                                                  │
//!   │  ┌────┬───────────────┬────┐┌────┬───────────────┬────┐         │
//!   │  │ Hdr│    payload    │Ftr ││ Hdr│    payload    │Ftr │   ...   │
//!   │  └────┴───────────────┴────┘└────┴───────────────┴────┘         │
//!   │                                                                  │
//!   └──────────────────────────────────────────────────────────────────┘
//!
//!   Each block is bracketed by a signed size tag at both ends: positive
//!   means free, negative means allocated. A free block's payload opens
//!   with two link words threading it into the arena's free list, so the
//!   list costs no extra memory beyond the blocks it already tracks.
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   tagheap
//!   ├── tag        - boundary-tag arithmetic and the BlockCursor (internal)
//!   ├── free_list  - the explicit doubly-linked free list (internal)
//!   ├── error      - ArenaError
//!   └── arena      - Arena, the public allocator
//! ```
//!
//! ## Quick Start
//!
//! ```rust
//! use tagheap::Arena;
//!
//! let mut arena = Arena::new(4096).unwrap();
//! let a = arena.allocate(64).unwrap();
//! let b = arena.allocate(128).unwrap();
//!
//! arena.free(a);
//! let c = arena.reallocate(b, 256).unwrap();
//! arena.free(c);
//! ```
//!
//! ## Allocation strategy
//!
//! `allocate` scans the free list for the best fit (smallest block that
//! still satisfies the request), splitting off the remainder when it is
//! large enough to host a block of its own. `free` coalesces the freed
//! block with both physical neighbors when they are themselves free, so
//! the free list never holds two adjacent free blocks (I6).
//!
//! ## Limitations
//!
//! - **Single-threaded only**: no synchronization primitives; `Arena` is
//!   neither `Send` nor `Sync` by virtue of its raw pointer field.
//! - **Single arena**: one fixed-size region per `Arena`, acquired once at
//!   construction and never grown or shrunk.
//! - **Natural alignment only**: payloads are aligned to the boundary tag's
//!   word size, not to arbitrary caller-requested alignments.
//!
//! ## Safety
//!
//! This crate is inherently unsafe as it deals with raw memory management.
//! All pointer arithmetic is confined to [`tag::BlockCursor`]; the public
//! `Arena` API is safe to call (aside from the caller's obligation to pass
//! back only pointers it has itself handed out).

mod arena;
mod error;
mod free_list;
mod tag;

pub use arena::Arena;
pub use error::ArenaError;
