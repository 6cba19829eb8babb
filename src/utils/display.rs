use crate::knowledge::KnowledgeRow;
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.chars().count()).bright_cyan());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_warning(text: &str) {
    println!("{}", text.yellow());
}

pub fn print_rows(rows: &[KnowledgeRow]) {
    for (i, row) in rows.iter().enumerate() {
        println!("{} {}", format!("{:>3}.", i + 1).green().bold(), row);
    }
}
