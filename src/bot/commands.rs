use crate::error::{PlayerError, PlayerResult};

/// Comando de texto ya separado del prefijo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation<'a> {
    pub name: String,
    pub args: Vec<&'a str>,
}

impl<'a> Invocation<'a> {
    pub fn arg(&self, index: usize) -> Option<&'a str> {
        self.args.get(index).copied()
    }

    /// Todos los argumentos desde `index`, unidos con espacios
    pub fn rest(&self, index: usize) -> String {
        self.args.get(index..).map(|a| a.join(" ")).unwrap_or_default()
    }
}

/// Separa `!play https://...` en nombre y argumentos. `None` si no es un comando.
pub fn parse_invocation<'a>(prefix: &str, content: &'a str) -> Option<Invocation<'a>> {
    let body = content.trim_start().strip_prefix(prefix)?;
    let mut parts = body.split_whitespace();
    let name = parts.next()?.to_lowercase();

    Some(Invocation {
        name,
        args: parts.collect(),
    })
}

/// Número positivo (base 1) escrito por el usuario
pub fn parse_number(arg: Option<&str>, what: &str) -> PlayerResult<usize> {
    let raw = arg.ok_or_else(|| PlayerError::validation(format!("falta el {}", what)))?;
    match raw.trim_start_matches('#').parse::<usize>() {
        Ok(n) if n > 0 => Ok(n),
        _ => Err(PlayerError::validation(format!(
            "el {} debe ser un número mayor a 0, recibido '{}'",
            what, raw
        ))),
    }
}

/// Página opcional; sin argumento es la primera
pub fn parse_page(arg: Option<&str>) -> PlayerResult<usize> {
    match arg {
        None => Ok(1),
        some => parse_number(some, "número de página"),
    }
}

pub fn parse_volume(arg: Option<&str>) -> PlayerResult<i64> {
    let raw = arg.ok_or_else(|| PlayerError::validation("falta el volumen (0-200)"))?;
    raw.trim_end_matches('%')
        .parse::<i64>()
        .map_err(|_| PlayerError::validation(format!("'{}' no es un volumen válido", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_invocation() {
        let inv = parse_invocation("!", "  !Play https://youtu.be/x  extra").unwrap();
        assert_eq!(inv.name, "play");
        assert_eq!(inv.args, vec!["https://youtu.be/x", "extra"]);
        assert_eq!(inv.rest(0), "https://youtu.be/x extra");
        assert_eq!(inv.rest(5), "");

        assert_eq!(parse_invocation("!", "hola !play"), None);
        assert_eq!(parse_invocation("!", "!"), None);
        assert_eq!(parse_invocation("$$", "$$np").unwrap().name, "np");
    }

    #[test]
    fn test_parse_number() {
        assert_eq!(parse_number(Some("3"), "número").unwrap(), 3);
        assert_eq!(parse_number(Some("#12"), "número").unwrap(), 12);
        for bad in [Some("0"), Some("-1"), Some("tres"), None] {
            assert!(matches!(
                parse_number(bad, "número"),
                Err(PlayerError::Validation(_))
            ));
        }
    }

    #[test]
    fn test_parse_page_and_volume() {
        assert_eq!(parse_page(None).unwrap(), 1);
        assert_eq!(parse_page(Some("2")).unwrap(), 2);
        assert!(parse_page(Some("x")).is_err());

        assert_eq!(parse_volume(Some("150%")).unwrap(), 150);
        assert_eq!(parse_volume(Some("-5")).unwrap(), -5);
        assert!(parse_volume(Some("alto")).is_err());
        assert!(parse_volume(None).is_err());
    }
}
