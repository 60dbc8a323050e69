/// One chat command: its full name, short alias and help line.
#[derive(Debug, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub alias: &'static str,
    /// Argument placeholder shown in help, if the command takes one.
    pub argument: Option<&'static str>,
    pub description: &'static str,
}

impl CommandSpec {
    pub fn usage(&self, prefix: &str) -> String {
        match self.argument {
            Some(arg) => format!("{prefix}{} {arg}", self.name),
            None => format!("{prefix}{}", self.name),
        }
    }
}

pub const MUSIC_PLAY: CommandSpec = CommandSpec {
    name: "music play",
    alias: "mp",
    argument: Some("<keyword>"),
    description: "Searches YouTube and queues the first result",
};

pub const MUSIC_LIST: CommandSpec = CommandSpec {
    name: "music list",
    alias: "ml",
    argument: None,
    description: "Shows the current queue",
};

pub const MUSIC_HISTORY: CommandSpec = CommandSpec {
    name: "music history",
    alias: "mh",
    argument: None,
    description: "Shows every song queued in this server and its status",
};

pub const MUSIC_SKIP: CommandSpec = CommandSpec {
    name: "music skip",
    alias: "ms",
    argument: None,
    description: "Skips the song at the front of the queue",
};

pub const MUSIC_DELETE: CommandSpec = CommandSpec {
    name: "music delete",
    alias: "md",
    argument: Some("<index>"),
    description: "Removes the song at a queue position (1 is the current song)",
};

pub const MUSIC_CLEAR: CommandSpec = CommandSpec {
    name: "music clear",
    alias: "mc",
    argument: None,
    description: "Stops playback and empties the queue",
};

pub const LEAVE: CommandSpec = CommandSpec {
    name: "leave",
    alias: "l",
    argument: None,
    description: "Leaves the voice channel and empties the queue",
};

pub const HELP: CommandSpec = CommandSpec {
    name: "help",
    alias: "h",
    argument: None,
    description: "Shows this message",
};

pub const COMMANDS: [&CommandSpec; 8] = [
    &MUSIC_PLAY,
    &MUSIC_LIST,
    &MUSIC_HISTORY,
    &MUSIC_SKIP,
    &MUSIC_DELETE,
    &MUSIC_CLEAR,
    &LEAVE,
    &HELP,
];

#[derive(Debug, PartialEq, Eq)]
pub enum MusicCommand {
    /// Acts on one server's queue or voice connection.
    Guild(GuildCommand),
    Help,
    /// Known command with a missing or invalid argument.
    Usage(&'static CommandSpec),
    Unknown(String),
}

#[derive(Debug, PartialEq, Eq)]
pub enum GuildCommand {
    Play { keyword: String },
    List,
    History,
    Skip,
    Delete { index: usize },
    Clear,
    Leave,
}

/// Parses a chat message. `None` if it does not start with `prefix`.
///
/// Command words are matched case-insensitively; the argument keeps its case.
pub fn parse(prefix: &str, content: &str) -> Option<MusicCommand> {
    let rest = content.trim().strip_prefix(prefix)?;
    let words: Vec<&str> = rest.split_whitespace().collect();
    if words.is_empty() {
        return None;
    }

    for spec in COMMANDS {
        for form in [spec.name, spec.alias] {
            let form_words: Vec<&str> = form.split(' ').collect();
            if words.len() < form_words.len() {
                continue;
            }

            let matches = words
                .iter()
                .zip(&form_words)
                .all(|(word, expected)| word.eq_ignore_ascii_case(expected));
            if matches {
                let argument = words[form_words.len()..].join(" ");
                return Some(build(spec, argument));
            }
        }
    }

    Some(MusicCommand::Unknown(words.join(" ")))
}

fn build(spec: &'static CommandSpec, argument: String) -> MusicCommand {
    let command = match spec.name {
        "music play" if argument.is_empty() => return MusicCommand::Usage(spec),
        "music play" => GuildCommand::Play { keyword: argument },
        "music delete" => match argument.parse::<usize>() {
            Ok(index) if index > 0 => GuildCommand::Delete { index },
            _ => return MusicCommand::Usage(spec),
        },
        "music list" => GuildCommand::List,
        "music history" => GuildCommand::History,
        "music skip" => GuildCommand::Skip,
        "music clear" => GuildCommand::Clear,
        "leave" => GuildCommand::Leave,
        _ => return MusicCommand::Help,
    };
    MusicCommand::Guild(command)
}

pub fn help_text(prefix: &str) -> String {
    let mut text = String::from("🎶 **guild-dj commands**\n");
    for spec in COMMANDS {
        let alias = match spec.argument {
            Some(arg) => format!("{prefix}{} {arg}", spec.alias),
            None => format!("{prefix}{}", spec.alias),
        };
        text.push_str(&format!(
            "`{}` (`{}`): {}\n",
            spec.usage(prefix),
            alias,
            spec.description
        ));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn full_names_and_aliases_parse_to_the_same_command() {
        for (full, alias, expected) in [
            ("~music list", "~ml", MusicCommand::Guild(GuildCommand::List)),
            ("~music history", "~mh", MusicCommand::Guild(GuildCommand::History)),
            ("~music skip", "~ms", MusicCommand::Guild(GuildCommand::Skip)),
            ("~music clear", "~mc", MusicCommand::Guild(GuildCommand::Clear)),
            ("~leave", "~l", MusicCommand::Guild(GuildCommand::Leave)),
            ("~help", "~h", MusicCommand::Help),
        ] {
            assert_eq!(parse("~", full), Some(expected));
            assert_eq!(parse("~", alias), parse("~", full));
        }
    }

    #[test]
    fn play_keeps_the_whole_keyword() {
        assert_eq!(
            parse("~", "~music play  Daft Punk   One More Time "),
            Some(MusicCommand::Guild(GuildCommand::Play {
                keyword: "Daft Punk One More Time".into()
            }))
        );
        assert_eq!(
            parse("~", "~MP lofi"),
            Some(MusicCommand::Guild(GuildCommand::Play {
                keyword: "lofi".into()
            }))
        );
        assert_eq!(parse("~", "~mp"), Some(MusicCommand::Usage(&MUSIC_PLAY)));
    }

    #[test]
    fn delete_needs_a_positive_index() {
        assert_eq!(
            parse("~", "~md 2"),
            Some(MusicCommand::Guild(GuildCommand::Delete { index: 2 }))
        );
        assert_eq!(
            parse("~", "~music delete 10"),
            Some(MusicCommand::Guild(GuildCommand::Delete { index: 10 }))
        );
        for bad in ["~md", "~md 0", "~md -1", "~md two"] {
            assert_eq!(parse("~", bad), Some(MusicCommand::Usage(&MUSIC_DELETE)), "{bad}");
        }
    }

    #[test]
    fn other_messages_are_ignored_or_unknown() {
        assert_eq!(parse("~", "hello there"), None);
        assert_eq!(parse("~", "~"), None);
        assert_eq!(
            parse("~", "~music shuffle"),
            Some(MusicCommand::Unknown("music shuffle".into()))
        );
        // "leave" must not be read as the "l" alias plus an argument
        assert_eq!(parse("~", "~leave"), Some(MusicCommand::Guild(GuildCommand::Leave)));
        assert_eq!(parse("!", "!ms"), Some(MusicCommand::Guild(GuildCommand::Skip)));
    }

    #[test]
    fn help_lists_every_command_with_its_alias() {
        let help = help_text("~");

        assert_eq!(help.lines().count(), COMMANDS.len() + 1);
        assert!(help.contains("`~music play <keyword>` (`~mp <keyword>`)"));
        assert!(help.contains("`~leave` (`~l`)"));
    }
}
