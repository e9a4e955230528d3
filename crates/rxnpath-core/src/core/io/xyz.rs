use super::traits::{Frame, MolecularFile};
use crate::core::models::element::Element;
use crate::core::models::geometry::Geometry;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {message}")]
    Parse { line: usize, message: String },
}

/// The plain XYZ format: an atom count, a comment line, then one
/// `symbol x y z` line per atom, repeated for each frame.
pub struct XyzFile;

impl MolecularFile for XyzFile {
    type Error = XyzError;

    fn read_from(reader: &mut impl BufRead) -> Result<Vec<Frame>, Self::Error> {
        let mut lines = reader.lines().enumerate();
        let mut frames = Vec::new();

        loop {
            let Some((count_no, count_line)) = lines.next() else {
                break;
            };
            let count_line = count_line?;
            if count_line.trim().is_empty() {
                continue;
            }
            let count: usize = count_line.trim().parse().map_err(|_| XyzError::Parse {
                line: count_no + 1,
                message: format!("expected atom count, found '{}'", count_line.trim()),
            })?;

            let comment = match lines.next() {
                Some((_, line)) => line?.trim_end().to_string(),
                None => String::new(),
            };

            let mut elements = Vec::with_capacity(count);
            let mut coords = Vec::with_capacity(count);
            for _ in 0..count {
                let (line_no, line) = lines.next().ok_or_else(|| XyzError::Parse {
                    line: count_no + 1,
                    message: format!("frame declares {count} atoms but the file ends early"),
                })?;
                let line = line?;
                let (element, position) = parse_atom_line(&line).map_err(|message| {
                    XyzError::Parse {
                        line: line_no + 1,
                        message,
                    }
                })?;
                elements.push(element);
                coords.push(position);
            }
            frames.push(Frame::new(comment, Geometry::new(elements, coords)));
        }
        Ok(frames)
    }

    fn write_to(frames: &[Frame], writer: &mut impl Write) -> Result<(), Self::Error> {
        for frame in frames {
            writeln!(writer, "{}", frame.geometry.atom_count())?;
            writeln!(writer, "{}", frame.comment.replace('\n', " "))?;
            for (element, p) in frame.geometry.elements().iter().zip(frame.geometry.coords()) {
                writeln!(
                    writer,
                    "{:<2} {:>14.8} {:>14.8} {:>14.8}",
                    element.symbol(),
                    p.x,
                    p.y,
                    p.z
                )?;
            }
        }
        Ok(())
    }
}

fn parse_atom_line(line: &str) -> Result<(Element, Point3<f64>), String> {
    let mut fields = line.split_whitespace();
    let symbol = fields.next().ok_or("empty atom line")?;
    let element = symbol.parse::<Element>().map_err(|e| e.to_string())?;
    let mut xyz = [0.0; 3];
    for value in &mut xyz {
        let field = fields.next().ok_or("expected three coordinates")?;
        *value = field
            .parse()
            .map_err(|_| format!("invalid coordinate '{field}'"))?;
    }
    Ok((element, Point3::new(xyz[0], xyz[1], xyz[2])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const WATER: &str = "3\nwater\nO 0.0 0.0 0.0\nH 0.96 0.0 0.0\nH -0.24 0.93 0.0\n";

    #[test]
    fn read_from_parses_single_frame() {
        let frames = XyzFile::read_from(&mut Cursor::new(WATER)).unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].comment, "water");
        assert_eq!(frames[0].geometry.elements(), &[Element::O, Element::H, Element::H]);
        assert_eq!(frames[0].geometry.coords()[1], Point3::new(0.96, 0.0, 0.0));
    }

    #[test]
    fn read_from_parses_multiple_frames() {
        let text = format!("{WATER}{WATER}");
        let frames = XyzFile::read_from(&mut Cursor::new(text)).unwrap();
        assert_eq!(frames.len(), 2);
    }

    #[test]
    fn read_from_reports_truncated_frame() {
        let err = XyzFile::read_from(&mut Cursor::new("3\ncut\nO 0 0 0\n")).unwrap_err();
        assert!(matches!(err, XyzError::Parse { line: 1, .. }));
    }

    #[test]
    fn read_from_reports_bad_coordinate_with_line_number() {
        let err = XyzFile::read_from(&mut Cursor::new("1\n\nH 0.0 abc 0.0\n")).unwrap_err();
        match err {
            XyzError::Parse { line, message } => {
                assert_eq!(line, 3);
                assert!(message.contains("abc"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn written_frames_read_back_identically() {
        let frames = XyzFile::read_from(&mut Cursor::new(WATER)).unwrap();
        let mut buffer = Vec::new();
        XyzFile::write_to(&frames, &mut buffer).unwrap();
        let reread = XyzFile::read_from(&mut Cursor::new(buffer)).unwrap();
        assert_eq!(reread[0].comment, "water");
        for (a, b) in reread[0].geometry.coords().iter().zip(frames[0].geometry.coords()) {
            assert!((a - b).norm() < 1e-8);
        }
    }

    #[test]
    fn path_helpers_write_and_read_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("water.xyz");
        let frames = XyzFile::read_from(&mut Cursor::new(WATER)).unwrap();
        XyzFile::write_to_path(&frames, &path).unwrap();
        let reread = XyzFile::read_from_path(&path).unwrap();
        assert_eq!(reread.len(), 1);
    }
}
