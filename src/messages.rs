//! User-facing message catalogue.
//!
//! The language and its learners are Swahili-speaking, so every message that
//! reaches the host's output panel is Swahili. Log lines emitted through
//! `tracing` stay in English.

pub const PROGRAM_STARTING: &str = "🚀 Kuanzisha utekelezaji wa programu...";
pub const PROGRAM_COMPLETED: &str = "✨ Programu imekamilika kwa mafanikio!";
pub const PROGRAM_STOPPED: &str = "⏹️ Utekelezaji wa programu umesimamishwa";
pub const COMPONENTS_RESET: &str = "🔄 Vifaa vyote vimeresetishwa";
pub const WAIT_ELAPSED: &str = "Muda wa kusubiri umeisha";

pub fn executing(line: &str) -> String {
    format!("Inatekeleza: {}", line)
}

pub fn direct_command(command: &str) -> String {
    format!("> {}", command)
}

pub fn turned_on(pin: usize) -> String {
    format!("Kifaa nambari {} kimewashwa", pin)
}

pub fn turned_off(pin: usize) -> String {
    format!("Kifaa nambari {} kimezimwa", pin)
}

pub fn waiting(millis: f64) -> String {
    format!("Inasubiri kwa {}ms...", millis)
}

pub fn aborted_at(line: usize) -> String {
    format!("Programu imesimama kwenye mstari {}", line)
}
