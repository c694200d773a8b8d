/// An agent reply split into prose, fenced code segments, and the mode
/// label the agent was instructed to lead with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReply {
    pub mode: String,
    pub response: String,
    pub code_blocks: Vec<String>,
}

/// Split a raw reply on triple-backtick fences. Lines inside a fence go to
/// `code_blocks`, everything else stays in `response`. A fence that is
/// never closed does not produce a block. The mode label is the first
/// non-empty prose line, uppercased, with GENERAL as the fallback.
pub fn parse_reply(raw: &str) -> ParsedReply {
    let mut response = String::new();
    let mut code_blocks = Vec::new();
    let mut current_block = String::new();
    let mut in_code_block = false;

    for line in raw.lines() {
        if line.contains("```") {
            if in_code_block {
                code_blocks.push(std::mem::take(&mut current_block));
            }
            in_code_block = !in_code_block;
        } else if in_code_block {
            current_block.push_str(line);
            current_block.push('\n');
        } else {
            response.push_str(line);
            response.push('\n');
        }
    }

    let response = response.trim().to_string();
    let mode = response
        .lines()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .map(|line| line.to_uppercase())
        .unwrap_or_else(|| "GENERAL".to_string());

    ParsedReply {
        mode,
        response,
        code_blocks,
    }
}
