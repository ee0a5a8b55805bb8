//! ELF32 core file layout and streaming emitter
//!
//! Builds the bit-exact layout the standards require: `Elf32_Ehdr` (52
//! bytes) immediately followed by the program header table, one `PT_NOTE`
//! segment holding every task's register notes, and one `PT_LOAD` segment
//! per reported memory region. Everything is written through a sink one
//! record at a time; nothing bigger than a single note descriptor is ever
//! buffered.

use crate::error::{OsError, OsResult};

use super::ops::MemArea;
use super::regs::{CoreRegSet, FpRegSet, CORE_REGSET_WORDS};
use super::sink::CoredumpSink;

pub const ELFCLASS32: u8 = 1;
pub const ELFDATA2LSB: u8 = 1;
pub const EV_CURRENT: u8 = 1;
pub const ELFOSABI_ARM: u8 = 97;

pub const ET_CORE: u16 = 4;
pub const EM_ARM: u16 = 0x28;

pub const PT_NOTE: u32 = 4;
pub const PT_LOAD: u32 = 1;
pub const PF_R: u32 = 4;
pub const PF_W: u32 = 2;

pub const NT_PRSTATUS: u32 = 1;
pub const NT_PRFPREG: u32 = 2;

pub const EHDR_SIZE: u32 = 52;
pub const PHDR_SIZE: u32 = 32;

/// Byte offset of the register bank inside an `NT_PRSTATUS` descriptor.
pub const PRSTATUS_REG_OFFSET: usize = 72;
/// Declared `NT_PRSTATUS` descriptor size.
pub const PRSTATUS_DESC_SIZE: usize = 148;
/// Declared `NT_PRFPREG` descriptor size (only the first 132 bytes hold
/// real content: 16 `u64` d-registers plus one `u32` FPSCR; the rest is
/// padding, kept at the spec's declared size rather than shrinking it).
pub const FPREGSET_DESC_SIZE: usize = 260;

const NOTE_NAME: &[u8] = b"CORE\0";
const NOTE_NAME_PADDED: usize = 8; // round_up(5, 4)

#[inline]
fn round_up4(n: usize) -> usize {
    (n + 3) & !3
}

/// One task's register snapshot as handed to the emitter.
pub struct TaskNote {
    pub task_id: u32,
    pub regs: CoreRegSet,
    pub fp_regs: Option<FpRegSet>,
}

fn note_record_len(descsz: usize) -> usize {
    12 + NOTE_NAME_PADDED + round_up4(descsz)
}

fn task_note_len(note: &TaskNote) -> usize {
    let mut len = note_record_len(PRSTATUS_DESC_SIZE);
    if note.fp_regs.is_some() {
        len += note_record_len(FPREGSET_DESC_SIZE);
    }
    len
}

fn notes_blob_len(notes: &[TaskNote]) -> u32 {
    notes.iter().map(|n| task_note_len(n) as u32).sum()
}

fn write_note_header(sink: &mut impl CoredumpSink, descsz: u32, ty: u32) -> OsResult<()> {
    sink.write(&(NOTE_NAME.len() as u32).to_le_bytes())?;
    sink.write(&descsz.to_le_bytes())?;
    sink.write(&ty.to_le_bytes())?;
    let mut name_buf = [0u8; NOTE_NAME_PADDED];
    name_buf[..NOTE_NAME.len()].copy_from_slice(NOTE_NAME);
    sink.write(&name_buf)
}

fn write_prstatus_note(sink: &mut impl CoredumpSink, task_id: u32, regs: &CoreRegSet) -> OsResult<()> {
    write_note_header(sink, PRSTATUS_DESC_SIZE as u32, NT_PRSTATUS)?;

    let mut desc = [0u8; PRSTATUS_DESC_SIZE];
    // signal (u16 @ offset 12) stays zero; lwpid (u32 @ offset 24) carries
    // this task's registry identity.
    desc[24..28].copy_from_slice(&task_id.to_le_bytes());

    for (i, word) in regs.as_words().iter().enumerate().take(CORE_REGSET_WORDS) {
        let off = PRSTATUS_REG_OFFSET + i * 4;
        desc[off..off + 4].copy_from_slice(&word.to_le_bytes());
    }

    sink.write(&desc)
}

fn write_fpregset_note(sink: &mut impl CoredumpSink, fp: &FpRegSet) -> OsResult<()> {
    write_note_header(sink, FPREGSET_DESC_SIZE as u32, NT_PRFPREG)?;

    let mut desc = [0u8; FPREGSET_DESC_SIZE];
    for (i, d) in fp.d.iter().enumerate() {
        let off = i * 8;
        desc[off..off + 8].copy_from_slice(&d.to_le_bytes());
    }
    desc[128..132].copy_from_slice(&fp.fpscr.to_le_bytes());

    sink.write(&desc)
}

fn write_ehdr(sink: &mut impl CoredumpSink, phnum: u16) -> OsResult<()> {
    let mut ehdr = [0u8; EHDR_SIZE as usize];
    ehdr[0] = 0x7F;
    ehdr[1] = b'E';
    ehdr[2] = b'L';
    ehdr[3] = b'F';
    ehdr[4] = ELFCLASS32;
    ehdr[5] = ELFDATA2LSB;
    ehdr[6] = EV_CURRENT;
    ehdr[7] = ELFOSABI_ARM;
    // bytes 8..16 (EI_ABIVERSION + EI_PAD) stay zero

    ehdr[16..18].copy_from_slice(&ET_CORE.to_le_bytes());
    ehdr[18..20].copy_from_slice(&EM_ARM.to_le_bytes());
    ehdr[20..24].copy_from_slice(&(EV_CURRENT as u32).to_le_bytes());
    // e_entry (24..28) stays zero
    ehdr[28..32].copy_from_slice(&EHDR_SIZE.to_le_bytes()); // e_phoff
    // e_shoff (32..36), e_flags (36..40) stay zero
    ehdr[40..42].copy_from_slice(&(EHDR_SIZE as u16).to_le_bytes()); // e_ehsize
    ehdr[42..44].copy_from_slice(&(PHDR_SIZE as u16).to_le_bytes()); // e_phentsize
    ehdr[44..46].copy_from_slice(&phnum.to_le_bytes());
    // e_shentsize, e_shnum, e_shstrndx (46..52) stay zero

    sink.write(&ehdr)
}

fn write_phdr(
    sink: &mut impl CoredumpSink,
    p_type: u32,
    p_offset: u32,
    p_vaddr: u32,
    p_filesz: u32,
    p_memsz: u32,
    p_flags: u32,
) -> OsResult<()> {
    let mut phdr = [0u8; PHDR_SIZE as usize];
    phdr[0..4].copy_from_slice(&p_type.to_le_bytes());
    phdr[4..8].copy_from_slice(&p_offset.to_le_bytes());
    phdr[8..12].copy_from_slice(&p_vaddr.to_le_bytes());
    phdr[12..16].copy_from_slice(&p_vaddr.to_le_bytes()); // p_paddr == p_vaddr
    phdr[16..20].copy_from_slice(&p_filesz.to_le_bytes());
    phdr[20..24].copy_from_slice(&p_memsz.to_le_bytes());
    phdr[24..28].copy_from_slice(&p_flags.to_le_bytes());
    phdr[28..32].copy_from_slice(&4u32.to_le_bytes()); // p_align
    sink.write(&phdr)
}

/// Stream one memory region's contents in bounded chunks so the emitter
/// never buffers a whole region at once.
///
/// # Safety
/// Caller must ensure `[area.start, area.start + area.len)` is readable
/// for the duration of the call.
unsafe fn write_region_bytes(sink: &mut impl CoredumpSink, area: &MemArea) -> OsResult<()> {
    const CHUNK: usize = 64;
    let base = area.start as *const u8;
    let mut written = 0usize;
    while written < area.len as usize {
        let take = (area.len as usize - written).min(CHUNK);
        let chunk = unsafe { core::slice::from_raw_parts(base.add(written), take) };
        sink.write(chunk)?;
        written += take;
    }
    Ok(())
}

/// Stream a complete ELF32 core file through `sink`.
///
/// Two-pass: first compute the notes blob size and program header count,
/// then emit bytes in file order (header, program headers, notes blob,
/// region blobs), accumulating each `PT_LOAD`'s file offset as it goes.
///
/// # Safety
/// Caller must ensure every region in `regions` is currently readable.
pub unsafe fn emit_coredump(
    sink: &mut impl CoredumpSink,
    notes: &[TaskNote],
    regions: &[MemArea],
) -> OsResult<()> {
    if regions.is_empty() {
        return Err(OsError::CoredumpNoRegions);
    }

    let phnum = 1 + regions.len();
    if phnum > u16::MAX as usize {
        return Err(OsError::CoredumpOverflow);
    }

    let notes_offset = EHDR_SIZE + PHDR_SIZE * phnum as u32;
    let notes_len = notes_blob_len(notes);

    write_ehdr(sink, phnum as u16)?;
    write_phdr(sink, PT_NOTE, notes_offset, 0, notes_len, notes_len, 0)?;

    let mut region_offset = notes_offset + notes_len;
    for area in regions {
        write_phdr(sink, PT_LOAD, region_offset, area.start, area.len, area.len, PF_R | PF_W)?;
        region_offset += area.len;
    }

    for note in notes {
        write_prstatus_note(sink, note.task_id, &note.regs)?;
        if let Some(fp) = &note.fp_regs {
            write_fpregset_note(sink, fp)?;
        }
    }

    for area in regions {
        unsafe { write_region_bytes(sink, area)? };
    }

    sink.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ArraySink {
        out: [u8; 1024],
        len: usize,
    }

    impl ArraySink {
        fn new() -> Self {
            ArraySink { out: [0; 1024], len: 0 }
        }

        fn bytes(&self) -> &[u8] {
            &self.out[..self.len]
        }
    }

    impl CoredumpSink for ArraySink {
        fn write(&mut self, bytes: &[u8]) -> OsResult<()> {
            if self.len + bytes.len() > self.out.len() {
                return Err(OsError::CoredumpOverflow);
            }
            self.out[self.len..self.len + bytes.len()].copy_from_slice(bytes);
            self.len += bytes.len();
            Ok(())
        }
    }

    fn sample_note(task_id: u32) -> TaskNote {
        let mut regs = CoreRegSet::zeroed();
        regs.pc = 0x0800_1234;
        regs.sp = 0x2000_1000;
        TaskNote { task_id, regs, fp_regs: None }
    }

    #[test]
    fn header_fields_match_layout() {
        let mut sink = ArraySink::new();
        let region = [0u8; 16];
        let areas = [MemArea { start: region.as_ptr() as u32, len: region.len() as u32 }];
        let notes = [sample_note(7)];

        unsafe { emit_coredump(&mut sink, &notes, &areas).unwrap() };

        let bytes = sink.bytes();
        assert_eq!(&bytes[0..4], &[0x7F, b'E', b'L', b'F']);
        assert_eq!(bytes[4], ELFCLASS32);
        assert_eq!(bytes[5], ELFDATA2LSB);
        assert_eq!(u16::from_le_bytes([bytes[16], bytes[17]]), ET_CORE);
        assert_eq!(u16::from_le_bytes([bytes[18], bytes[19]]), EM_ARM);
        assert_eq!(u32::from_le_bytes([bytes[28], bytes[29], bytes[30], bytes[31]]), EHDR_SIZE);
        let phnum = u16::from_le_bytes([bytes[44], bytes[45]]);
        assert_eq!(phnum, 2); // PT_NOTE + one PT_LOAD
    }

    #[test]
    fn rejects_zero_regions() {
        let mut sink = ArraySink::new();
        let notes = [sample_note(1)];
        let result = unsafe { emit_coredump(&mut sink, &notes, &[]) };
        assert_eq!(result, Err(OsError::CoredumpNoRegions));
    }

    #[test]
    fn prstatus_note_carries_task_id_and_registers() {
        let mut sink = ArraySink::new();
        let region = [0u8; 8];
        let areas = [MemArea { start: region.as_ptr() as u32, len: region.len() as u32 }];
        let notes = [sample_note(42)];

        unsafe { emit_coredump(&mut sink, &notes, &areas).unwrap() };

        let notes_offset = (EHDR_SIZE + PHDR_SIZE * 2) as usize;
        let desc_offset = notes_offset + 12 + NOTE_NAME_PADDED;
        let bytes = sink.bytes();

        let lwpid = u32::from_le_bytes(bytes[desc_offset + 24..desc_offset + 28].try_into().unwrap());
        assert_eq!(lwpid, 42);

        let pc_off = desc_offset + PRSTATUS_REG_OFFSET + 15 * 4;
        let pc = u32::from_le_bytes(bytes[pc_off..pc_off + 4].try_into().unwrap());
        assert_eq!(pc, 0x0800_1234);
    }

    #[test]
    fn phdr_file_offsets_are_contiguous() {
        let mut sink = ArraySink::new();
        let region_a = [0u8; 4];
        let region_b = [0u8; 8];
        let areas = [
            MemArea { start: region_a.as_ptr() as u32, len: region_a.len() as u32 },
            MemArea { start: region_b.as_ptr() as u32, len: region_b.len() as u32 },
        ];
        let notes = [sample_note(1)];

        unsafe { emit_coredump(&mut sink, &notes, &areas).unwrap() };

        let bytes = sink.bytes();
        let phdr0 = EHDR_SIZE as usize + PHDR_SIZE as usize; // skip PT_NOTE phdr
        let off_a = u32::from_le_bytes(bytes[phdr0 + 4..phdr0 + 8].try_into().unwrap());
        let phdr1 = phdr0 + PHDR_SIZE as usize;
        let off_b = u32::from_le_bytes(bytes[phdr1 + 4..phdr1 + 8].try_into().unwrap());
        assert_eq!(off_b, off_a + region_a.len() as u32);
    }
}
