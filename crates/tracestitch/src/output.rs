use std::io::IsTerminal;

use owo_colors::OwoColorize;
use tracestitch_core::model::{Timing, Trace};

pub fn print_trace_human(trace: &Trace) {
    println!(
        "TRACE {} name=\"{}\" machine={} duration={} nodes={}",
        trace.id,
        trace.name,
        trace.machine_name,
        format_ms(trace.duration_ms),
        trace.node_count()
    );
    match &trace.root {
        Some(root) => print_node(root, 0, std::io::stdout().is_terminal()),
        None => println!("(no timings)"),
    }
}

fn print_node(timing: &Timing, depth: usize, color: bool) {
    let indent = "  ".repeat(depth);
    let duration = timing
        .duration_ms
        .map(format_ms)
        .unwrap_or_else(|| "open".to_string());
    let start = format!("+{}", format_ms(timing.start_ms));
    if color {
        println!("{indent}{} {} ({})", start.bright_black(), timing.name, duration.cyan());
    } else {
        println!("{indent}{start} {} ({duration})", timing.name);
    }

    for sub in &timing.sub_timings {
        println!(
            "{indent}  · {} +{} ({}) {}",
            sub.kind,
            format_ms(sub.start_ms),
            format_ms(sub.duration_ms),
            sub.command
        );
    }
    for child in &timing.children {
        print_node(child, depth + 1, color);
    }
}

pub fn format_ms(ms: f64) -> String {
    format!("{ms:.1}ms")
}

#[cfg(test)]
mod tests {
    use super::format_ms;

    #[test]
    fn formats_milliseconds_with_one_decimal() {
        assert_eq!(format_ms(120.0), "120.0ms");
        assert_eq!(format_ms(0.04), "0.0ms");
        assert_eq!(format_ms(12.34), "12.3ms");
    }
}
