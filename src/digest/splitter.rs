use tracing::debug;

use super::MailingList;

/// Raw posting blocks from one digest, oldest first.
#[derive(Debug, Clone, Default)]
pub struct DigestBatch {
    pub blocks: Vec<String>,
    /// Blocks found before windowing.
    pub total_blocks: usize,
}

/// Split a raw digest into posting blocks, keeping the trailing `window`.
///
/// A `From:` header opens a block. A `From:` naming the list's own digest
/// author suppresses everything through the matching `End of … Digest`
/// line. Mailbox separators (`From user at host  date`) are dropped, as are
/// stray lines outside any block.
#[must_use]
pub fn split_digest(raw: &str, list: MailingList, window: usize) -> DigestBatch {
    let digest_author = list.digest_author();
    let end_marker = list.digest_end_marker();

    let mut blocks: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut suppressed = false;

    for line in raw.lines() {
        if suppressed {
            if end_marker.is_some_and(|marker| line.starts_with(marker)) {
                suppressed = false;
            }
            continue;
        }

        let words: Vec<&str> = line.split_whitespace().collect();

        if words.len() >= 3 && words[0] == "From:" {
            flush(&mut blocks, &mut current);
            if digest_author.is_some_and(|author| words[1] == author) {
                debug!(list = %list, "Skipping embedded digest");
                suppressed = true;
                continue;
            }
            current.push(line);
        } else if words.len() >= 3 && words[0] == "From" && words[2] == "at" {
            // mbox separator
        } else if !current.is_empty() {
            current.push(line);
        }
    }
    flush(&mut blocks, &mut current);

    let total_blocks = blocks.len();
    let blocks = blocks.split_off(total_blocks.saturating_sub(window));

    DigestBatch {
        blocks,
        total_blocks,
    }
}

fn flush(blocks: &mut Vec<String>, current: &mut Vec<&str>) {
    if !current.is_empty() {
        blocks.push(current.join("\n"));
        current.clear();
    }
}
