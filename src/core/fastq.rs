use memchr::memchr;

#[derive(Clone, Copy, Debug)]
pub struct ReadView<'a> {
    pub id: &'a [u8],
    pub seq: &'a [u8],
    pub qual: &'a [u8],
}

#[derive(Clone, Copy, Debug)]
pub struct ParseError {
    pub byte_offset: usize,
    pub reason: &'static str,
}

#[inline]
fn trim_cr(line: &[u8]) -> &[u8] {
    match line {
        [head @ .., b'\r'] => head,
        _ => line,
    }
}

/// Split one line off `data` starting at `pos`; the final line may be
/// unterminated.
#[inline]
fn next_line(data: &[u8], pos: &mut usize) -> Option<(usize, usize)> {
    if *pos >= data.len() {
        return None;
    }
    let start = *pos;
    let end = match memchr(b'\n', &data[start..]) {
        Some(i) => start + i,
        None => data.len(),
    };
    *pos = end + 1;
    Some((start, end))
}

/// Parse a chunk of complete FASTQ records into borrowed views. The chunkers
/// align chunk boundaries on record boundaries, so a trailing partial record
/// is a parse error, not an expected condition.
pub fn parse_fastq_chunk<'a>(
    data: &'a [u8],
    out: &mut Vec<ReadView<'a>>,
) -> Result<(), ParseError> {
    let mut pos = 0usize;
    while pos < data.len() {
        let record_start = pos;
        let (hs, he) = next_line(data, &mut pos).ok_or(ParseError {
            byte_offset: record_start,
            reason: "truncated record",
        })?;
        let header = trim_cr(&data[hs..he]);
        if header.is_empty() && pos >= data.len() {
            break; // trailing blank line
        }
        if header.first() != Some(&b'@') {
            return Err(ParseError {
                byte_offset: record_start,
                reason: "record does not start with '@'",
            });
        }
        let (ss, se) = next_line(data, &mut pos).ok_or(ParseError {
            byte_offset: record_start,
            reason: "missing sequence line",
        })?;
        let (ps, pe) = next_line(data, &mut pos).ok_or(ParseError {
            byte_offset: record_start,
            reason: "missing separator line",
        })?;
        if data[ps..pe].first() != Some(&b'+') {
            return Err(ParseError {
                byte_offset: ps,
                reason: "separator line does not start with '+'",
            });
        }
        let (qs, qe) = next_line(data, &mut pos).ok_or(ParseError {
            byte_offset: record_start,
            reason: "missing quality line",
        })?;
        let seq = trim_cr(&data[ss..se]);
        let qual = trim_cr(&data[qs..qe]);
        if seq.len() != qual.len() {
            return Err(ParseError {
                byte_offset: qs,
                reason: "sequence and quality lengths differ",
            });
        }
        out.push(ReadView {
            id: &header[1..],
            seq,
            qual,
        });
    }
    Ok(())
}

/// Iterator over FASTA records in a fully loaded buffer. Sequence lines are
/// concatenated into an owned buffer per record; headers are borrowed.
pub struct FastaRecords<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> FastaRecords<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }
}

impl<'a> Iterator for FastaRecords<'a> {
    type Item = (&'a [u8], Vec<u8>);

    fn next(&mut self) -> Option<Self::Item> {
        // Skip to the next header line.
        loop {
            let (s, e) = next_line(self.data, &mut self.pos)?;
            let line = trim_cr(&self.data[s..e]);
            if line.first() == Some(&b'>') {
                let id = &line[1..];
                let mut seq = Vec::new();
                while self.pos < self.data.len() && self.data[self.pos] != b'>' {
                    let (ls, le) = match next_line(self.data, &mut self.pos) {
                        Some(r) => r,
                        None => break,
                    };
                    seq.extend_from_slice(trim_cr(&self.data[ls..le]));
                }
                return Some((id, seq));
            }
        }
    }
}

/// First significant byte decides the format of a population source.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum SeqFormat {
    Fasta,
    Fastq,
}

pub fn sniff_format(data: &[u8]) -> Option<SeqFormat> {
    match data.iter().find(|b| !b.is_ascii_whitespace())? {
        b'>' => Some(SeqFormat::Fasta),
        b'@' => Some(SeqFormat::Fastq),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_fastq_records() {
        let data = b"@r1 left\nACGT\n+\nIIII\n@r2\nGGCC\n+r2\nJJJJ\n";
        let mut out = Vec::new();
        parse_fastq_chunk(data, &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].id, b"r1 left");
        assert_eq!(out[0].seq, b"ACGT");
        assert_eq!(out[1].qual, b"JJJJ");
    }

    #[test]
    fn rejects_malformed_records() {
        let mut out = Vec::new();
        let err = parse_fastq_chunk(b"@r1\nACGT\n+\nII\n", &mut out).unwrap_err();
        assert_eq!(err.reason, "sequence and quality lengths differ");
        assert!(parse_fastq_chunk(b"r1\nACGT\n+\nIIII\n", &mut out).is_err());
        assert!(parse_fastq_chunk(b"@r1\nACGT\n", &mut out).is_err());
    }

    #[test]
    fn handles_crlf() {
        let data = b"@r1\r\nACGT\r\n+\r\nIIII\r\n";
        let mut out = Vec::new();
        parse_fastq_chunk(data, &mut out).unwrap();
        assert_eq!(out[0].seq, b"ACGT");
        assert_eq!(out[0].qual, b"IIII");
    }

    #[test]
    fn fasta_concatenates_wrapped_lines() {
        let data = b">chr1 test\nACGT\nGGTT\n>chr2\nTTAA\n";
        let records: Vec<_> = FastaRecords::new(data).collect();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].0, b"chr1 test");
        assert_eq!(records[0].1, b"ACGTGGTT");
        assert_eq!(records[1].1, b"TTAA");
    }

    #[test]
    fn format_sniffing() {
        assert_eq!(sniff_format(b"\n>chr"), Some(SeqFormat::Fasta));
        assert_eq!(sniff_format(b"@read"), Some(SeqFormat::Fastq));
        assert_eq!(sniff_format(b"ACGT"), None);
        assert_eq!(sniff_format(b""), None);
    }
}
