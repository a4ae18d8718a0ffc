/// Comandos de texto que entiende el bot
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `play|p <búsqueda o URL>`; la búsqueda puede venir vacía
    Play(String),
    Skip,
    Stop,
    Queue,
    /// `volume|vol [n]`; sin argumento consulta el nivel
    Volume(Option<String>),
    Repeat,
    NowPlaying,
    Shuffle,
    /// `askloop|ask [playlist]`
    AskLoop(Option<String>),
    Ai,
    Help,
}

impl Command {
    /// Interpreta un mensaje; `None` si no lleva el prefijo o el comando no existe.
    ///
    /// El nombre del comando no distingue mayúsculas; los argumentos se
    /// conservan tal cual, sin espacios sobrantes.
    pub fn parse(content: &str, prefix: &str) -> Option<Command> {
        let body = content.trim_start().strip_prefix(prefix)?;
        let body = body.trim();

        let (name, args) = match body.split_once(char::is_whitespace) {
            Some((name, args)) => (name, args.trim()),
            None => (body, ""),
        };
        let optional = || (!args.is_empty()).then(|| args.to_string());

        let command = match name.to_lowercase().as_str() {
            "play" | "p" => Command::Play(args.to_string()),
            "skip" | "s" => Command::Skip,
            "stop" => Command::Stop,
            "queue" | "q" => Command::Queue,
            "volume" | "vol" => Command::Volume(optional()),
            "repeat" | "loop" => Command::Repeat,
            "nowplaying" | "np" => Command::NowPlaying,
            "shuffle" => Command::Shuffle,
            "askloop" | "ask" => Command::AskLoop(optional()),
            "ai" => Command::Ai,
            "help" | "h" => Command::Help,
            _ => return None,
        };

        Some(command)
    }

    /// Nombre canónico, usado en los logs
    pub fn name(&self) -> &'static str {
        match self {
            Command::Play(_) => "play",
            Command::Skip => "skip",
            Command::Stop => "stop",
            Command::Queue => "queue",
            Command::Volume(_) => "volume",
            Command::Repeat => "repeat",
            Command::NowPlaying => "nowplaying",
            Command::Shuffle => "shuffle",
            Command::AskLoop(_) => "askloop",
            Command::Ai => "ai",
            Command::Help => "help",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_play_keeps_query() {
        assert_eq!(
            Command::parse("!play  never gonna give you up ", "!"),
            Some(Command::Play("never gonna give you up".to_string()))
        );
        assert_eq!(
            Command::parse("!p https://youtu.be/dQw4w9WgXcQ", "!"),
            Some(Command::Play("https://youtu.be/dQw4w9WgXcQ".to_string()))
        );
        assert_eq!(Command::parse("!play", "!"), Some(Command::Play(String::new())));
    }

    #[test]
    fn test_aliases() {
        let cases = [
            ("!s", Command::Skip),
            ("!skip", Command::Skip),
            ("!stop", Command::Stop),
            ("!q", Command::Queue),
            ("!loop", Command::Repeat),
            ("!repeat", Command::Repeat),
            ("!np", Command::NowPlaying),
            ("!shuffle", Command::Shuffle),
            ("!ask", Command::AskLoop(None)),
            ("!ai", Command::Ai),
            ("!h", Command::Help),
        ];
        for (input, expected) in cases {
            assert_eq!(Command::parse(input, "!"), Some(expected), "{}", input);
        }
    }

    #[test]
    fn test_optional_arguments() {
        assert_eq!(Command::parse("!volume", "!"), Some(Command::Volume(None)));
        assert_eq!(
            Command::parse("!vol 7", "!"),
            Some(Command::Volume(Some("7".to_string())))
        );
        assert_eq!(
            Command::parse("!askloop chill", "!"),
            Some(Command::AskLoop(Some("chill".to_string())))
        );
    }

    #[test]
    fn test_case_insensitive_name() {
        assert_eq!(Command::parse("!SKIP", "!"), Some(Command::Skip));
    }

    #[test]
    fn test_unknown_and_unprefixed_are_ignored() {
        assert_eq!(Command::parse("!meme", "!"), None);
        assert_eq!(Command::parse("play algo", "!"), None);
        assert_eq!(Command::parse("!", "!"), None);
        assert_eq!(Command::parse("?play x", "!"), None);
    }

    #[test]
    fn test_custom_prefix() {
        assert_eq!(Command::parse("m!np", "m!"), Some(Command::NowPlaying));
        assert_eq!(Command::parse("!np", "m!"), None);
    }
}
