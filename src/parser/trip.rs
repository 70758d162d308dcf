use std::sync::LazyLock;

use regex::Regex;

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d{1,2}:\d{2}$").unwrap());

/// One token of a candidate trip line. "Uhr" lexes as its own keyword, so a
/// malformed line like `84888 08:38 Uhr - 10:07 Uhr` yields an empty stop
/// capture instead of a stop literally named "Uhr".
#[derive(Debug, Clone, PartialEq, Eq)]
enum Token<'a> {
    Number(&'a str),
    Time(&'a str),
    Uhr,
    Dash,
    LParen,
    RParen,
    Word(&'a str),
}

/// Result of matching one line against the two trip grammars.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TripMatch {
    /// `<digits> <time> [Uhr] <stop> - <time> [Uhr] <stop>`
    New {
        train_number: String,
        from_time: String,
        from_stop: String,
        to_time: String,
        to_stop: String,
    },
    /// `<digits> <stop> (<time> [Uhr]) - <stop> (<time> [Uhr])`
    Old {
        train_number: String,
        from_stop: String,
        from_time: String,
        to_stop: String,
        to_time: String,
    },
}

/// A parsed trip still lacking its resolved line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionalTrip {
    pub train_number: String,
    pub from_stop: String,
    pub from_time: String,
    pub to_stop: String,
    pub to_time: String,
}

impl TripMatch {
    pub fn into_trip(self) -> ProvisionalTrip {
        match self {
            TripMatch::New {
                train_number,
                from_time,
                from_stop,
                to_time,
                to_stop,
            }
            | TripMatch::Old {
                train_number,
                from_stop,
                from_time,
                to_stop,
                to_time,
            } => ProvisionalTrip {
                train_number,
                from_stop,
                from_time,
                to_stop,
                to_time,
            },
        }
    }
}

/// Try both grammars in order. A line is a valid trip iff this returns Some.
pub fn parse_line(line: &str) -> Option<TripMatch> {
    let tokens = tokenize(line);
    match_new(&tokens).or_else(|| match_old(&tokens))
}

fn tokenize(line: &str) -> Vec<Token<'_>> {
    let mut tokens = Vec::new();
    for raw in line.split_whitespace() {
        let mut core = raw;
        while let Some(rest) = core.strip_prefix('(') {
            tokens.push(Token::LParen);
            core = rest;
        }
        let mut closers = 0;
        while let Some(rest) = core.strip_suffix(')') {
            closers += 1;
            core = rest;
        }
        if !core.is_empty() {
            tokens.push(classify(core));
        }
        for _ in 0..closers {
            tokens.push(Token::RParen);
        }
    }
    tokens
}

fn classify(s: &str) -> Token<'_> {
    if s.chars().all(|c| c.is_ascii_digit()) {
        Token::Number(s)
    } else if TIME_RE.is_match(s) {
        Token::Time(s)
    } else if s == "Uhr" {
        Token::Uhr
    } else if s == "-" || s == "–" {
        Token::Dash
    } else {
        Token::Word(s)
    }
}

fn match_new(tokens: &[Token]) -> Option<TripMatch> {
    let train_number = as_number(tokens.first()?)?;
    let from_time = as_time(tokens.get(1)?)?;
    let mut i = 2;
    i = skip_uhr(tokens, i);
    let (from_stop, dash_at) = words_until(tokens, i, |t| *t == Token::Dash)?;
    i = dash_at + 1;
    let to_time = as_time(tokens.get(i)?)?;
    i = skip_uhr(tokens, i + 1);
    let to_stop = trailing_words(tokens, i)?;
    Some(TripMatch::New {
        train_number,
        from_time,
        from_stop,
        to_time,
        to_stop,
    })
}

fn match_old(tokens: &[Token]) -> Option<TripMatch> {
    let train_number = as_number(tokens.first()?)?;
    let (from_stop, paren_at) = words_until(tokens, 1, |t| *t == Token::LParen)?;
    let (from_time, mut i) = paren_time(tokens, paren_at)?;
    if tokens.get(i)? != &Token::Dash {
        return None;
    }
    let (to_stop, paren_at) = words_until(tokens, i + 1, |t| *t == Token::LParen)?;
    let (to_time, end) = paren_time(tokens, paren_at)?;
    i = end;
    if i != tokens.len() {
        return None;
    }
    Some(TripMatch::Old {
        train_number,
        from_stop,
        from_time,
        to_stop,
        to_time,
    })
}

/// Collect stop-name tokens from `start` until `stop` matches. A capture
/// must begin with a Word but may continue with bare numbers, so names
/// like `Karlsruhe Gleis 2` survive. Fails on an empty capture or on any
/// other token before the terminator.
fn words_until(
    tokens: &[Token],
    start: usize,
    stop: impl Fn(&Token) -> bool,
) -> Option<(String, usize)> {
    let mut words = Vec::new();
    for (i, t) in tokens.iter().enumerate().skip(start) {
        if stop(t) {
            if words.is_empty() {
                return None;
            }
            return Some((words.join(" "), i));
        }
        match t {
            Token::Word(w) => words.push(*w),
            Token::Number(n) if !words.is_empty() => words.push(*n),
            _ => return None,
        }
    }
    None
}

fn trailing_words(tokens: &[Token], start: usize) -> Option<String> {
    let mut words = Vec::new();
    for t in &tokens[start.min(tokens.len())..] {
        match t {
            Token::Word(w) => words.push(*w),
            Token::Number(n) if !words.is_empty() => words.push(*n),
            _ => return None,
        }
    }
    if words.is_empty() {
        None
    } else {
        Some(words.join(" "))
    }
}

/// `LParen Time [Uhr] RParen` starting at `at`; returns the time and the
/// index just past the closing paren.
fn paren_time(tokens: &[Token], at: usize) -> Option<(String, usize)> {
    if tokens.get(at)? != &Token::LParen {
        return None;
    }
    let time = as_time(tokens.get(at + 1)?)?;
    let mut i = skip_uhr(tokens, at + 2);
    if tokens.get(i)? != &Token::RParen {
        return None;
    }
    i += 1;
    Some((time, i))
}

fn skip_uhr(tokens: &[Token], i: usize) -> usize {
    if tokens.get(i) == Some(&Token::Uhr) {
        i + 1
    } else {
        i
    }
}

fn as_number(t: &Token) -> Option<String> {
    match t {
        Token::Number(n) => Some((*n).to_string()),
        _ => None,
    }
}

fn as_time(t: &Token) -> Option<String> {
    match t {
        Token::Time(s) => Some((*s).to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_format_round_trip() {
        let m = parse_line("84888 08:38 Uhr Söllingen Bahnhof - 10:07 Uhr Germersheim Bahnhof")
            .expect("should parse");
        let trip = m.into_trip();
        assert_eq!(trip.train_number, "84888");
        assert_eq!(trip.from_time, "08:38");
        assert_eq!(trip.from_stop, "Söllingen Bahnhof");
        assert_eq!(trip.to_time, "10:07");
        assert_eq!(trip.to_stop, "Germersheim Bahnhof");
    }

    #[test]
    fn old_format_round_trip() {
        let m = parse_line("123 Karlsruhe Hbf (10:30 Uhr) - Bruchsal (11:00)").expect("should parse");
        assert!(matches!(m, TripMatch::Old { .. }));
        let trip = m.into_trip();
        assert_eq!(trip.train_number, "123");
        assert_eq!(trip.from_stop, "Karlsruhe Hbf");
        assert_eq!(trip.from_time, "10:30");
        assert_eq!(trip.to_stop, "Bruchsal");
        assert_eq!(trip.to_time, "11:00");
    }

    #[test]
    fn new_format_without_uhr() {
        let m = parse_line("84888 08:38 Söllingen - 10:07 Germersheim").expect("should parse");
        assert!(matches!(m, TripMatch::New { .. }));
    }

    #[test]
    fn missing_stop_rejected() {
        // Malformed split: "Uhr" where a stop should be.
        assert!(parse_line("84888 08:38 Uhr - 10:07 Uhr").is_none());
        assert!(parse_line("84888 08:38 Uhr Söllingen - 10:07 Uhr").is_none());
    }

    #[test]
    fn stop_names_may_contain_numbers() {
        let m = parse_line("84888 08:38 Uhr Karlsruhe Gleis 2 - 10:07 Uhr Germersheim Bahnhof")
            .expect("should parse");
        let trip = m.into_trip();
        assert_eq!(trip.from_stop, "Karlsruhe Gleis 2");

        let m = parse_line("123 Karlsruhe Gleis 2 (10:30 Uhr) - Bruchsal (11:00)")
            .expect("should parse");
        assert_eq!(m.into_trip().from_stop, "Karlsruhe Gleis 2");
    }

    #[test]
    fn en_dash_accepted() {
        assert!(parse_line("84888 08:38 Uhr Söllingen – 10:07 Uhr Germersheim").is_some());
    }

    #[test]
    fn fragments_rejected() {
        assert!(parse_line("84888 08:38").is_none());
        assert!(parse_line("84888 08:38 Uhr Söllingen Bahnhof").is_none());
        assert!(parse_line("Söllingen Bahnhof - Germersheim Bahnhof").is_none());
        assert!(parse_line("").is_none());
    }

    #[test]
    fn trailing_junk_rejected() {
        assert!(parse_line("123 Karlsruhe Hbf (10:30 Uhr) - Bruchsal (11:00) extra 99").is_none());
    }

    #[test]
    fn deterministic() {
        let line = "84888 08:38 Uhr Söllingen Bahnhof - 10:07 Uhr Germersheim Bahnhof";
        assert_eq!(parse_line(line), parse_line(line));
    }
}
