//! UI相关功能模块
//!
//! 彩色输出和测速进度条

use std::sync::Mutex;

use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use xrc_cli::{render_table, Reporter};
use xrc_core::Node;

const BANNER: &str = r#"
██╗  ██╗██████╗  ██████╗
╚██╗██╔╝██╔══██╗██╔════╝
 ╚███╔╝ ██████╔╝██║
 ██╔██╗ ██╔══██╗██║
██╔╝ ██╗██║  ██║╚██████╗
╚═╝  ╚═╝╚═╝  ╚═╝ ╚═════╝
"#;

/// 当前终端是否支持彩色输出
pub fn supports_color() -> bool {
    console::Term::stdout().features().colors_supported()
}

/// 创建一个标准格式的进度条
pub fn create_progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    if let Ok(style) = ProgressStyle::default_bar()
        .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")
    {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb
}

/// 打印横幅
pub fn print_banner(version: &str) {
    println!(
        "{}\n{}\n",
        BANNER.cyan().bold(),
        format!("Version: {}", version).yellow()
    );
}

/// 彩色终端输出，测速时显示进度条
#[derive(Default)]
pub struct ColorReporter {
    progress: Mutex<Option<ProgressBar>>,
}

impl ColorReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// 进度条显示期间的输出要经过进度条，避免画面错乱
    fn println(&self, line: String) {
        match self.progress.lock() {
            Ok(guard) => match guard.as_ref() {
                Some(pb) => pb.println(line),
                None => println!("{}", line),
            },
            Err(_) => println!("{}", line),
        }
    }
}

impl Reporter for ColorReporter {
    fn info(&self, msg: &str) {
        self.println(format!("{} {}", "i".blue().bold(), msg));
    }

    fn success(&self, msg: &str) {
        self.println(format!("{} {}", "✓".green().bold(), msg));
    }

    fn warning(&self, msg: &str) {
        self.println(format!("{} {}", "!".yellow().bold(), msg));
    }

    fn error(&self, msg: &str) {
        eprintln!("{} {}", "✗".red().bold(), msg);
    }

    fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        let rendered = render_table(headers, rows);
        let mut lines = rendered.lines();
        if let Some(header) = lines.next() {
            println!("{}", header.bright_black().bold());
        }
        for line in lines {
            println!("{}", line);
        }
    }

    fn probe_progress(&self, node: &Node, done: usize, total: usize) {
        let Ok(mut guard) = self.progress.lock() else {
            return;
        };
        let pb = guard.get_or_insert_with(|| create_progress_bar(total as u64));
        let latency = match node.delay {
            d if d < 0 => "timeout".red(),
            0..=300 => format!("{}ms", node.delay).green(),
            301..=1000 => format!("{}ms", node.delay).yellow(),
            _ => format!("{}ms", node.delay).red(),
        };
        pb.set_message(format!("{} {}", node.name.cyan(), latency));
        pb.set_position(done as u64);
    }

    fn probe_finished(&self) {
        if let Ok(mut guard) = self.progress.lock() {
            if let Some(pb) = guard.take() {
                pb.finish_and_clear();
            }
        }
    }
}
