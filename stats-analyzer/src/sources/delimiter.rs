//! Delimiter sniffing for CSV-like files.

use tracing::debug;

/// Delimiters the sniffer can recognize, in tie-break order.
pub const CANDIDATES: [u8; 3] = [b',', b';', b'\t'];

/// Fallback when no candidate dominates.
pub const DEFAULT_DELIMITER: u8 = b',';

/// Result of [`sniff_delimiter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelimiterDetection {
    pub delimiter: u8,
    /// False when the sample gave no majority and the default was used
    pub detected: bool,
}

/// Picks the delimiter by majority vote over the lines of `sample`.
///
/// Every non-empty line votes for the candidate it contains most often,
/// ignoring characters inside double quotes. A candidate wins when it gets
/// more than half of the votes cast. Lines without any candidate do not vote.
pub fn sniff_delimiter(sample: &str) -> DelimiterDetection {
    let mut votes = [0usize; CANDIDATES.len()];
    let mut voting_lines = 0usize;

    for line in sample.lines().filter(|l| !l.trim().is_empty()) {
        let counts = count_candidates(line);
        let Some((winner, &best)) = counts
            .iter()
            .enumerate()
            .max_by(|(ia, a), (ib, b)| a.cmp(b).then(ib.cmp(ia)))
        else {
            continue;
        };
        if best == 0 {
            continue;
        }
        votes[winner] += 1;
        voting_lines += 1;
    }

    debug!(?votes, voting_lines, "Delimiter votes");

    for (idx, &count) in votes.iter().enumerate() {
        if count * 2 > voting_lines {
            return DelimiterDetection {
                delimiter: CANDIDATES[idx],
                detected: true,
            };
        }
    }

    DelimiterDetection {
        delimiter: DEFAULT_DELIMITER,
        detected: false,
    }
}

fn count_candidates(line: &str) -> [usize; CANDIDATES.len()] {
    let mut counts = [0usize; CANDIDATES.len()];
    let mut in_quotes = false;
    for byte in line.bytes() {
        if byte == b'"' {
            in_quotes = !in_quotes;
            continue;
        }
        if in_quotes {
            continue;
        }
        if let Some(idx) = CANDIDATES.iter().position(|&c| c == byte) {
            counts[idx] += 1;
        }
    }
    counts
}
