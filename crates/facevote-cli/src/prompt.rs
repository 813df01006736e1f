use facevote_core::{Ballot, IdentityProfile};
use facevote_engine::{ChoicePrompt, PromptResponse};
use std::io::{self, BufRead, Write};

/// Line-oriented ballot prompt: a number picks a choice, `s` skips this
/// voter, `q` ends the session. End of input counts as `q`.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl TerminalPrompt<io::StdinLock<'static>, io::Stdout> {
    pub fn stdio() -> Self {
        Self::new(io::stdin().lock(), io::stdout())
    }
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn show(&mut self, profile: &IdentityProfile, ballot: &Ballot) -> io::Result<()> {
        writeln!(self.output)?;
        writeln!(
            self.output,
            "Voter {} ({}, {})",
            profile.voter_id(),
            profile.name(),
            profile.constituency()
        )?;
        for (i, choice) in ballot.choices().iter().enumerate() {
            writeln!(self.output, "  {}) {choice}", i + 1)?;
        }
        Ok(())
    }

    fn ask(&mut self, ballot: &Ballot) -> io::Result<PromptResponse> {
        loop {
            write!(self.output, "Choice [1-{}, s = skip, q = quit]: ", ballot.len())?;
            self.output.flush()?;

            let mut line = String::new();
            if self.input.read_line(&mut line)? == 0 {
                return Ok(PromptResponse::Quit);
            }

            let answer = line.trim();
            match answer {
                "s" | "S" => return Ok(PromptResponse::Skip),
                "q" | "Q" => return Ok(PromptResponse::Quit),
                _ => {}
            }
            if let Some(choice) = answer.parse().ok().and_then(|n| ballot.choice(n)) {
                return Ok(PromptResponse::Cast(choice));
            }
            writeln!(self.output, "Not a valid choice: {answer:?}")?;
        }
    }
}

impl<R: BufRead, W: Write> ChoicePrompt for TerminalPrompt<R, W> {
    fn choose(&mut self, profile: &IdentityProfile, ballot: &Ballot) -> PromptResponse {
        let response = self.show(profile, ballot).and_then(|()| self.ask(ballot));
        response.unwrap_or_else(|e| {
            tracing::warn!(error = %e, "terminal prompt failed, ending session");
            PromptResponse::Quit
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use facevote_core::{Choice, NamePolicy, VoterId};
    use std::io::Cursor;

    fn ask(input: &str) -> (PromptResponse, String) {
        let profile = IdentityProfile::new(
            VoterId::parse("123456789012").unwrap(),
            "Asha",
            "Pune",
            NamePolicy::Strict,
        )
        .unwrap();
        let ballot = Ballot::new(["BJP", "CONGRESS", "AAP"]).unwrap();
        let mut output = Vec::new();
        let response =
            TerminalPrompt::new(Cursor::new(input.as_bytes()), &mut output).choose(&profile, &ballot);
        (response, String::from_utf8(output).unwrap())
    }

    #[test]
    fn test_number_picks_choice() {
        let (response, output) = ask("3\n");
        assert_eq!(response, PromptResponse::Cast(Choice::Candidate("AAP".into())));
        assert!(output.contains("Voter 123456789012 (Asha, Pune)"));
        assert!(output.contains("4) NOTA"));
    }

    #[test]
    fn test_last_position_is_nota() {
        assert_eq!(ask("4\n").0, PromptResponse::Cast(Choice::Nota));
    }

    #[test]
    fn test_invalid_input_reprompts() {
        let (response, output) = ask("9\nabc\n1\n");
        assert_eq!(response, PromptResponse::Cast(Choice::Candidate("BJP".into())));
        assert_eq!(output.matches("Not a valid choice").count(), 2);
    }

    #[test]
    fn test_skip_quit_and_eof() {
        assert_eq!(ask("s\n").0, PromptResponse::Skip);
        assert_eq!(ask("q\n").0, PromptResponse::Quit);
        assert_eq!(ask("").0, PromptResponse::Quit);
        assert_eq!(ask("0\n").0, PromptResponse::Quit);
    }
}
