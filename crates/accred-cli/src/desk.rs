//! Answering review requests from the terminal.

use std::io::{self, BufRead, Write};

use accred_intake::review::{
  ConfirmationDecision, ConfirmationPrompt, ReviewDesk, ReviewRequest, UnmatchedAction,
  UnmatchedPrompt,
};

/// Serve `desk` from stdin until every reviewer is gone.
///
/// Runs on a detached thread; a stdin read still pending when the batch ends
/// must not block runtime shutdown.
pub fn spawn_terminal_desk(mut desk: ReviewDesk) {
  std::thread::spawn(move || {
    let stdin = io::stdin();
    while let Some(request) = desk.blocking_next() {
      match request {
        ReviewRequest::Confirm(pending) => {
          eprint!("{}", format_confirmation(&pending.prompt));
          match read_answer(&stdin) {
            Some(line) => {
              pending.answer(parse_confirmation(&line));
            }
            // Dropping the request leaves the row unconfirmed.
            None => drop(pending),
          }
        }
        ReviewRequest::Unmatched(pending) => {
          eprint!("{}", format_unmatched(&pending.prompt));
          match read_answer(&stdin) {
            Some(line) => {
              pending.answer(parse_unmatched(&line));
            }
            None => drop(pending),
          }
        }
      }
    }
  });
}

fn read_answer(stdin: &io::Stdin) -> Option<String> {
  io::stderr().flush().ok();
  let mut line = String::new();
  match stdin.lock().read_line(&mut line) {
    Ok(0) | Err(_) => None,
    Ok(_) => Some(line),
  }
}

fn format_confirmation(prompt: &ConfirmationPrompt) -> String {
  let row = &prompt.row;
  let mut out = format!(
    "\nrow {}: {} {} {} born {}\n",
    row.index,
    row.surname.as_deref().unwrap_or("?"),
    row.name.as_deref().unwrap_or("?"),
    row.middle_name.as_deref().unwrap_or(""),
    row.birth_date.map(|d| d.to_string()).unwrap_or_else(|| "?".into()),
  );
  for problem in &prompt.problems {
    out.push_str(&format!("  - {problem}\n"));
  }
  if let Some(bucket) = prompt.suggested {
    out.push_str(&format!("  would go to {bucket}\n"));
  }
  out.push_str("accept this row? [y]es / [n]o > ");
  out
}

fn format_unmatched(prompt: &UnmatchedPrompt) -> String {
  format!(
    "\nrow {}: {} is not in the registry\n[a]ctivate / [q]ueue / [s]kip > ",
    prompt.row, prompt.data.identity
  )
}

/// Anything but an explicit yes rejects the row.
pub fn parse_confirmation(input: &str) -> ConfirmationDecision {
  match input.trim().to_lowercase().as_str() {
    "y" | "yes" | "д" | "да" => ConfirmationDecision::Confirmed,
    _ => ConfirmationDecision::Rejected,
  }
}

pub fn parse_unmatched(input: &str) -> UnmatchedAction {
  match input.trim().to_lowercase().as_str() {
    "a" | "activate" => UnmatchedAction::Activate,
    "q" | "queue" => UnmatchedAction::Queue,
    _ => UnmatchedAction::Skip,
  }
}
