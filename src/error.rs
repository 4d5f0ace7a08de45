use thiserror::Error;

/// Fatal conditions raised while standing up an arena.
///
/// Per-call allocation failure (insufficient space) is not modeled here;
/// `Arena::allocate`/`reallocate` surface that as a plain `None`, matching
/// the spec's "surfaced as a null return, the caller decides" contract.
/// Invalid frees are fatal and abort the process rather than returning an
/// error (the caller has already violated the contract by that point).
#[derive(Debug, Error)]
pub enum ArenaError {
    #[error("failed to acquire {requested} bytes from the host allocator")]
    OutOfSystemMemory { requested: usize },

    #[error(
        "arena size {requested} is too small to hold a single block (minimum {minimum} bytes)"
    )]
    SizeTooSmall { requested: usize, minimum: usize },
}
