//! Output formatting

use clap::ValueEnum;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
    Yaml,
}

impl OutputFormat {
    /// Print a single value
    pub fn print<T: Serialize>(&self, data: &T) {
        match self {
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(data).unwrap_or_default());
            }
            OutputFormat::Json | OutputFormat::Table => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
            }
        }
    }

    /// Print rows, as a table when requested
    pub fn print_rows<T: Serialize + Tabled>(&self, rows: &[T]) {
        match self {
            OutputFormat::Table => println!("{}", render_table(rows)),
            _ => self.print(&rows),
        }
    }
}

pub fn render_table<T: Tabled>(rows: &[T]) -> String {
    Table::new(rows).with(Style::rounded()).to_string()
}
