use bughouse::{Bound, EvaluationRecord, Score};

use super::ProtocolError;

const ERROR_PREFIX: &str = "info string ERROR: ";

/// What a single engine output line means to the sync layer.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisLine {
    Evaluation(EvaluationRecord),
    /// A withdrawn mate-in-zero; stale PV displays should be blanked.
    Clear,
    /// `readyok`
    Ready,
    /// Engine identification printed at startup.
    Banner(String),
    EngineError { message: String, fatal: bool },
    /// Anything else, dropped silently.
    Ignored,
}

/// Parse one line of engine output.
///
/// Evaluation lines follow the grammar
/// `info depth D seldepth S multipv M score (cp|mate) V [upperbound|lowerbound]
/// nodes N nps X [hashfull H] [tbhits T] time T pv MOVES`.
/// A line that starts like an evaluation but breaks that grammar is an error;
/// everything unrelated is [`AnalysisLine::Ignored`].
pub fn parse_line(line: &str) -> Result<AnalysisLine, ProtocolError> {
    let line = line.trim();

    if let Some(message) = line.strip_prefix(ERROR_PREFIX) {
        return Ok(AnalysisLine::EngineError {
            message: message.to_string(),
            fatal: message.contains("terminated"),
        });
    }

    let tokens: Vec<&str> = line.split_whitespace().collect();
    match tokens.first() {
        Some(&"readyok") => return Ok(AnalysisLine::Ready),
        Some(&"Fairy-Stockfish") | Some(&"Stockfish") => {
            return Ok(AnalysisLine::Banner(line.to_string()))
        }
        _ => {}
    }

    if has_mate_zero(&tokens) {
        return Ok(AnalysisLine::Clear);
    }

    let is_evaluation = tokens.starts_with(&["info", "depth"])
        && tokens.contains(&"score")
        && !tokens.contains(&"string");
    if !is_evaluation {
        return Ok(AnalysisLine::Ignored);
    }

    let record = parse_evaluation(line, &tokens)?;

    // Upper/lower bounds are only trusted on secondary PV lines.
    if record.bound.is_some() && record.multipv == 1 {
        return Ok(AnalysisLine::Ignored);
    }
    Ok(AnalysisLine::Evaluation(record))
}

fn has_mate_zero(tokens: &[&str]) -> bool {
    tokens
        .windows(3)
        .any(|w| w[0] == "score" && w[1] == "mate" && w[2].parse::<i32>() == Ok(0))
}

fn parse_evaluation(line: &str, tokens: &[&str]) -> Result<EvaluationRecord, ProtocolError> {
    let mut cursor = Cursor {
        line,
        tokens,
        pos: 0,
    };

    cursor.expect("info")?;
    cursor.expect("depth")?;
    let depth = cursor.number("depth")?;
    cursor.expect("seldepth")?;
    let seldepth = cursor.number("seldepth")?;
    cursor.expect("multipv")?;
    let multipv = cursor.number("multipv")?;

    cursor.expect("score")?;
    let score = match cursor.next("score type")? {
        "cp" => Score::Cp(cursor.number("cp")?),
        "mate" => Score::Mate(cursor.number("mate")?),
        _ => return Err(cursor.malformed("unknown score type")),
    };
    let bound = if cursor.eat("upperbound") {
        Some(Bound::Upper)
    } else if cursor.eat("lowerbound") {
        Some(Bound::Lower)
    } else {
        None
    };

    cursor.expect("nodes")?;
    let nodes: u64 = cursor.number("nodes")?;
    cursor.expect("nps")?;
    cursor.next("nps")?;
    if cursor.eat("hashfull") {
        cursor.number::<u64>("hashfull")?;
    }
    if cursor.eat("tbhits") {
        cursor.number::<u64>("tbhits")?;
    }
    cursor.expect("time")?;
    let time_ms: u64 = cursor.number("time")?;
    cursor.expect("pv")?;
    let pv: Vec<String> = cursor.rest().iter().map(|s| s.to_string()).collect();
    if pv.is_empty() {
        return Err(cursor.malformed("empty pv"));
    }

    Ok(EvaluationRecord {
        depth,
        seldepth,
        multipv,
        score,
        bound,
        nodes,
        time_ms,
        knps: nodes as f64 / time_ms.max(1) as f64,
        pv,
    })
}

/// Token reader over one evaluation line.
struct Cursor<'a> {
    line: &'a str,
    tokens: &'a [&'a str],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn next(&mut self, what: &'static str) -> Result<&'a str, ProtocolError> {
        let token = self.tokens.get(self.pos).copied().ok_or_else(|| {
            ProtocolError::Malformed {
                reason: format!("missing {}", what),
                line: self.line.to_string(),
            }
        })?;
        self.pos += 1;
        Ok(token)
    }

    fn expect(&mut self, keyword: &'static str) -> Result<(), ProtocolError> {
        match self.tokens.get(self.pos) {
            Some(&t) if t == keyword => {
                self.pos += 1;
                Ok(())
            }
            _ => Err(ProtocolError::Malformed {
                reason: format!("expected '{}'", keyword),
                line: self.line.to_string(),
            }),
        }
    }

    fn eat(&mut self, keyword: &str) -> bool {
        if self.tokens.get(self.pos) == Some(&keyword) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn number<T: std::str::FromStr>(&mut self, field: &'static str) -> Result<T, ProtocolError> {
        let token = self.next(field)?;
        token.parse().map_err(|_| ProtocolError::InvalidNumber {
            field,
            value: token.to_string(),
        })
    }

    fn rest(&mut self) -> &'a [&'a str] {
        let rest = &self.tokens[self.pos.min(self.tokens.len())..];
        self.pos = self.tokens.len();
        rest
    }

    fn malformed(&self, reason: &str) -> ProtocolError {
        ProtocolError::Malformed {
            reason: reason.to_string(),
            line: self.line.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn evaluation(line: &str) -> EvaluationRecord {
        match parse_line(line).unwrap() {
            AnalysisLine::Evaluation(record) => record,
            other => panic!("Expected evaluation, got {:?}", other),
        }
    }

    #[test]
    fn test_parse_evaluation() {
        let record = evaluation(
            "info depth 12 seldepth 20 multipv 1 score cp 35 nodes 100000 nps 500000 time 200 pv e2e4 e7e5",
        );
        assert_eq!(record.depth, 12);
        assert_eq!(record.seldepth, 20);
        assert_eq!(record.multipv, 1);
        assert_eq!(record.score, Score::Cp(35));
        assert_eq!(record.knps, 500.0);
        assert_eq!(record.pv, vec!["e2e4", "e7e5"]);
        assert_eq!(record.bound, None);
    }

    #[test]
    fn test_parse_mate_with_optional_fields() {
        let record = evaluation(
            "info depth 30 seldepth 12 multipv 2 score mate -3 nodes 5000 nps 1000 hashfull 12 tbhits 0 time 5 pv h7h8q g8h8",
        );
        assert_eq!(record.score, Score::Mate(-3));
        assert_eq!(record.multipv, 2);
        assert_eq!(record.knps, 1000.0);
    }

    #[test]
    fn test_bound_on_primary_pv_is_filtered() {
        let line = "info depth 9 seldepth 9 multipv 1 score cp 10 upperbound nodes 900 nps 9000 time 100 pv d2d4";
        assert_eq!(parse_line(line).unwrap(), AnalysisLine::Ignored);
    }

    #[test]
    fn test_bound_on_secondary_pv_is_kept() {
        let record = evaluation(
            "info depth 9 seldepth 9 multipv 3 score cp -40 lowerbound nodes 900 nps 9000 time 100 pv g1f3",
        );
        assert_eq!(record.bound, Some(Bound::Lower));
        assert_eq!(record.score, Score::Cp(-40));
    }

    #[test]
    fn test_mate_zero_clears() {
        let line = "info depth 1 seldepth 1 multipv 1 score mate 0 nodes 1 nps 100 time 1 pv";
        assert_eq!(parse_line(line).unwrap(), AnalysisLine::Clear);
        assert_eq!(
            parse_line("info depth 0 score mate 0").unwrap(),
            AnalysisLine::Clear
        );
    }

    #[test]
    fn test_zero_time_does_not_divide_by_zero() {
        let record = evaluation(
            "info depth 1 seldepth 1 multipv 1 score cp 5 nodes 20 nps 0 time 0 pv e2e4",
        );
        assert_eq!(record.knps, 20.0);
    }

    #[test]
    fn test_signals() {
        assert_eq!(parse_line("readyok").unwrap(), AnalysisLine::Ready);
        assert_eq!(
            parse_line("Fairy-Stockfish 14 LB by Fabian Fichter").unwrap(),
            AnalysisLine::Banner("Fairy-Stockfish 14 LB by Fabian Fichter".to_string())
        );
        assert_eq!(
            parse_line("info string ERROR: NNUE file missing").unwrap(),
            AnalysisLine::EngineError {
                message: "NNUE file missing".to_string(),
                fatal: false
            }
        );
        assert!(matches!(
            parse_line("info string ERROR: engine terminated").unwrap(),
            AnalysisLine::EngineError { fatal: true, .. }
        ));
    }

    #[test]
    fn test_unrelated_lines_are_ignored() {
        for line in [
            "uciok",
            "bestmove e2e4 ponder e7e5",
            "info depth 5 currmove e2e4 currmovenumber 1",
            "info string NNUE evaluation enabled",
            "",
        ] {
            assert_eq!(parse_line(line).unwrap(), AnalysisLine::Ignored, "{}", line);
        }
    }

    #[test]
    fn test_malformed_evaluation_is_an_error() {
        assert!(matches!(
            parse_line("info depth 12 multipv 1 score cp 35 nodes 1 nps 1 time 1 pv e2e4"),
            Err(ProtocolError::Malformed { .. })
        ));
        assert!(matches!(
            parse_line("info depth x seldepth 1 multipv 1 score cp 35 nodes 1 nps 1 time 1 pv e2e4"),
            Err(ProtocolError::InvalidNumber { field: "depth", .. })
        ));
        assert!(matches!(
            parse_line("info depth 1 seldepth 1 multipv 1 score cp 35 nodes 1 nps 1 time 1 pv"),
            Err(ProtocolError::Malformed { .. })
        ));
    }
}
