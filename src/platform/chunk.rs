/// Discord rejects messages longer than 2000 characters.
pub const DISCORD_MAX_MESSAGE_LEN: usize = 2000;

/// Split long messages for Discord's character limit.
///
/// Lengths are counted in chars. Each cut prefers the last newline at or
/// before `max_len`, falling back to a hard cut. Leading whitespace is
/// trimmed from what remains after every cut, so a chunk never opens with
/// the blank lines that preceded it.
pub fn split_message(text: &str, max_len: usize) -> Vec<String> {
    let max_len = max_len.max(1);
    if text.chars().count() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while remaining.chars().count() > max_len {
        // Byte offset of the char sitting at position `max_len`
        let limit = remaining
            .char_indices()
            .nth(max_len)
            .map(|(i, _)| i)
            .unwrap_or(remaining.len());
        let window_end = limit
            + remaining[limit..]
                .chars()
                .next()
                .map_or(0, char::len_utf8);

        let cut = match remaining[..window_end].rfind('\n') {
            Some(pos) if pos > 0 => pos,
            _ => limit,
        };

        chunks.push(remaining[..cut].to_string());
        remaining = remaining[cut..].trim_start();
    }

    if !remaining.is_empty() {
        chunks.push(remaining.to_string());
    }

    chunks
}
