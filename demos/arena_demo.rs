use tagheap::Arena;

/// Prints the arena's current occupancy: bytes accounted for versus the
/// arena's total size. Both numbers should always agree (invariant I1).
fn print_occupancy(label: &str, arena: &Arena) {
    log::info!("[{label}] total_accounted = {} / {} bytes", arena.total_accounted(), arena.len());
}

fn main() {
    env_logger::init();

    let mut arena = Arena::new(4096).expect("arena of this size should always be obtainable");
    log::info!("arena created: {} bytes", arena.len());

    // --------------------------------------------------------------------
    // 1) A handful of allocations of different sizes.
    // --------------------------------------------------------------------
    let a = arena.allocate(64).expect("allocation 1 should succeed");
    let b = arena.allocate(128).expect("allocation 2 should succeed");
    let c = arena.allocate(256).expect("allocation 3 should succeed");
    log::info!("allocated a, b, c");

    unsafe {
        a.as_ptr().write_bytes(b'A', 64);
        b.as_ptr().write_bytes(b'B', 128);
        c.as_ptr().write_bytes(b'C', 256);
    }

    // --------------------------------------------------------------------
    // 2) Free the middle allocation, then the first: this exercises
    //    backward coalescing once both are free.
    // --------------------------------------------------------------------
    arena.free(b);
    log::info!("freed b");
    arena.free(a);
    log::info!("freed a (coalesces with the hole left by b)");

    // --------------------------------------------------------------------
    // 3) Grow c in place via reallocate; its bytes should survive the move.
    // --------------------------------------------------------------------
    let c = arena.reallocate(c, 512).expect("growing c should succeed in a mostly-empty arena");
    let preserved = unsafe { c.as_ptr().read() };
    log::info!("reallocated c to 512 bytes, first byte preserved = 0x{preserved:02x}");

    // --------------------------------------------------------------------
    // 4) Demonstrate a failing reallocate: ask for far more than the arena
    //    could ever hold. The arena is left exactly as it was.
    // --------------------------------------------------------------------
    let failed = arena.reallocate(c, 1_000_000);
    log::info!("oversized reallocate returned {:?}", failed.is_some());

    print_occupancy("before teardown", &arena);
    arena.free(c);
    arena.close();
}
