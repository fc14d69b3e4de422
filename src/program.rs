//! Factory presets. Programs are identified by a contiguous index in
//! `[0, Plugin::PROGRAM_COUNT)`. Formats that address programs as MIDI-style bank and program pairs
//! use 128 programs per bank.

/// The number of programs in a single bank for bank/program addressed formats.
pub const PROGRAMS_PER_BANK: u32 = 128;

/// Convert a bank and program pair to a program index. Returns `None` if the resulting index is
/// outside of `[0, program_count)`.
pub fn real_program(bank: u32, program: u32, program_count: u32) -> Option<u32> {
    let index = bank
        .checked_mul(PROGRAMS_PER_BANK)?
        .checked_add(program)?;

    (index < program_count).then_some(index)
}

/// The inverse of [`real_program()`].
pub fn bank_and_program(index: u32) -> (u32, u32) {
    (index / PROGRAMS_PER_BANK, index % PROGRAMS_PER_BANK)
}
