//! SVG serialisation of recorded display lists.

use std::fmt::Write;

use super::canvas::{Canvas, Color, DisplayList, DrawCommand};

/// Stacks `lists` vertically into one SVG document.
pub fn render_document(lists: &[&DisplayList]) -> String {
    let width = lists.iter().map(|l| l.width()).fold(0.0f32, f32::max);
    let height: f32 = lists.iter().map(|l| l.height()).sum();

    let mut out = String::new();
    let _ = writeln!(
        out,
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{width}" height="{height}" viewBox="0 0 {width} {height}">"#
    );
    let mut offset = 0.0f32;
    for list in lists {
        let _ = writeln!(out, r#"<g transform="translate(0,{offset})">"#);
        for command in list.commands() {
            write_command(&mut out, command);
        }
        out.push_str("</g>\n");
        offset += list.height();
    }
    out.push_str("</svg>\n");
    out
}

fn write_command(out: &mut String, command: &DrawCommand) {
    // Writing to a String cannot fail
    let _ = match command {
        DrawCommand::FillRect { x, y, w, h, color } => writeln!(
            out,
            r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="{}"{}/>"#,
            color.hex(),
            opacity("fill-opacity", color)
        ),
        DrawCommand::Line {
            from,
            to,
            color,
            width,
        } => writeln!(
            out,
            r#"<line x1="{}" y1="{}" x2="{}" y2="{}" stroke="{}" stroke-width="{width}"{}/>"#,
            from.0,
            from.1,
            to.0,
            to.1,
            color.hex(),
            opacity("stroke-opacity", color)
        ),
        DrawCommand::Polyline {
            points,
            color,
            width,
        } => {
            let mut coords = String::with_capacity(points.len() * 12);
            for (i, (x, y)) in points.iter().enumerate() {
                if i > 0 {
                    coords.push(' ');
                }
                let _ = write!(coords, "{x:.2},{y:.2}");
            }
            writeln!(
                out,
                r#"<polyline points="{coords}" fill="none" stroke="{}" stroke-width="{width}"{}/>"#,
                color.hex(),
                opacity("stroke-opacity", color)
            )
        }
        DrawCommand::Text {
            at,
            text,
            color,
            size,
        } => writeln!(
            out,
            r#"<text x="{}" y="{}" font-family="Arial" font-size="{size}" fill="{}"{}>{}</text>"#,
            at.0,
            at.1,
            color.hex(),
            opacity("fill-opacity", color),
            escape(text)
        ),
    };
}

fn opacity(attribute: &str, color: &Color) -> String {
    if color.a >= 1.0 {
        String::new()
    } else {
        format!(r#" {attribute}="{}""#, color.a)
    }
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            c => out.push(c),
        }
    }
    out
}
