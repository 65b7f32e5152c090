use xrc_core::Node;

/// 命令执行结果的输出方式
pub trait Reporter: Send + Sync {
    fn info(&self, msg: &str);
    fn success(&self, msg: &str);
    fn warning(&self, msg: &str);
    fn error(&self, msg: &str);
    fn table(&self, headers: &[&str], rows: &[Vec<String>]);

    /// 一个节点测速完成
    fn probe_progress(&self, _node: &Node, _done: usize, _total: usize) {}

    /// 全部测速结束
    fn probe_finished(&self) {}
}

/// 不带颜色的纯文本输出
#[derive(Debug, Default, Clone, Copy)]
pub struct PlainReporter;

impl Reporter for PlainReporter {
    fn info(&self, msg: &str) {
        println!("{}", msg);
    }

    fn success(&self, msg: &str) {
        println!("{}", msg);
    }

    fn warning(&self, msg: &str) {
        println!("warning: {}", msg);
    }

    fn error(&self, msg: &str) {
        eprintln!("{}", msg);
    }

    fn table(&self, headers: &[&str], rows: &[Vec<String>]) {
        print!("{}", render_table(headers, rows));
    }
}

/// 左对齐、无边框的表格，最后追加一个空行
pub fn render_table(headers: &[&str], rows: &[Vec<String>]) -> String {
    let mut widths: Vec<usize> = headers.iter().map(|h| display_width(h)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(display_width(cell));
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = headers.iter().map(|h| h.to_uppercase()).collect();
    push_row(&mut out, &header, &widths);
    for row in rows {
        push_row(&mut out, row, &widths);
    }
    out.push('\n');
    out
}

fn push_row(out: &mut String, cells: &[String], widths: &[usize]) {
    let last = cells.len().saturating_sub(1);
    for (i, cell) in cells.iter().enumerate() {
        out.push_str(cell);
        if i < last {
            let pad = widths.get(i).copied().unwrap_or(0).saturating_sub(display_width(cell));
            out.push_str(&" ".repeat(pad));
            out.push('\t');
        }
    }
    out.push('\n');
}

/// 中日韩字符按两列计算
fn display_width(s: &str) -> usize {
    s.chars()
        .map(|c| if c as u32 >= 0x1100 { 2 } else { 1 })
        .sum()
}
