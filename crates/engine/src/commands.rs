//! Recognizes bot commands in inbound text.
//!
//! - `/start`, `/help` → help
//! - `/feifei`, `/pic` → generate; trailing text becomes a custom prompt
//! - configured trigger phrases (exact match) → generate

use courier_common::types::Command;

const HELP_COMMANDS: &[&str] = &["start", "help"];
const GENERATE_COMMANDS: &[&str] = &["feifei", "pic"];

/// A recognized command with its optional custom prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: Command,
    pub prompt: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CommandParser {
    trigger_phrases: Vec<String>,
}

impl CommandParser {
    pub fn new(trigger_phrases: Vec<String>) -> Self {
        Self { trigger_phrases }
    }

    pub fn parse(&self, text: &str) -> Option<ParsedCommand> {
        let text = text.trim();

        if let Some(rest) = text.strip_prefix('/') {
            let (head, args) = match rest.split_once(char::is_whitespace) {
                Some((head, args)) => (head, args.trim()),
                None => (rest, ""),
            };
            // `/feifei@my_bot` in group chats
            let name = head.split('@').next().unwrap_or(head).to_lowercase();

            if HELP_COMMANDS.contains(&name.as_str()) {
                return Some(ParsedCommand {
                    command: Command::Help,
                    prompt: None,
                });
            }
            if GENERATE_COMMANDS.contains(&name.as_str()) {
                return Some(ParsedCommand {
                    command: Command::Generate,
                    prompt: (!args.is_empty()).then(|| args.to_string()),
                });
            }
            return None;
        }

        self.trigger_phrases
            .iter()
            .any(|phrase| phrase == text)
            .then_some(ParsedCommand {
                command: Command::Generate,
                prompt: None,
            })
    }

    pub fn trigger_phrases(&self) -> &[String] {
        &self.trigger_phrases
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parser() -> CommandParser {
        CommandParser::new(vec!["来张妃妃".to_string(), "妃妃照片".to_string()])
    }

    fn generate(prompt: Option<&str>) -> Option<ParsedCommand> {
        Some(ParsedCommand {
            command: Command::Generate,
            prompt: prompt.map(str::to_string),
        })
    }

    #[test]
    fn test_help_commands() {
        for text in ["/start", "/help", " /HELP ", "/start@courier_bot"] {
            assert_eq!(parser().parse(text).unwrap().command, Command::Help, "{}", text);
        }
    }

    #[test]
    fn test_generate_and_alias() {
        assert_eq!(parser().parse("/feifei"), generate(None));
        assert_eq!(parser().parse("/pic"), generate(None));
        assert_eq!(parser().parse("/feifei@courier_bot"), generate(None));
    }

    #[test]
    fn test_custom_prompt() {
        assert_eq!(
            parser().parse("/feifei  穿着宇航服 在月球上 "),
            generate(Some("穿着宇航服 在月球上"))
        );
    }

    #[test]
    fn test_trigger_phrases() {
        assert_eq!(parser().parse("来张妃妃"), generate(None));
        assert_eq!(parser().parse(" 妃妃照片\n"), generate(None));
        assert_eq!(parser().parse("我想要来张妃妃"), None);
    }

    #[test]
    fn test_unrecognized() {
        assert_eq!(parser().parse("hello"), None);
        assert_eq!(parser().parse("/unknown"), None);
        assert_eq!(parser().parse(""), None);
        assert_eq!(parser().parse("/"), None);
    }
}
