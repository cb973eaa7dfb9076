use std::fmt::{self, Write as _};

struct HexBytes<'a>(&'a [u8]);

impl fmt::Display for HexBytes<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        for (i, b) in self.0.iter().enumerate() {
            if i != 0 {
                fmt.write_char(' ')?;
            }
            write!(fmt, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Shows tabs and trailing spaces of a line.
struct Visible<'a>(&'a str);

impl fmt::Display for Visible<'_> {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        let body = self.0.trim_end();
        for c in body.chars() {
            match c {
                '\t' => fmt.write_char('→')?,
                _ => fmt.write_char(c)?,
            }
        }
        for c in self.0[body.len()..].chars() {
            match c {
                '\t' => fmt.write_char('→')?,
                _ => fmt.write_char('•')?,
            }
        }
        Ok(())
    }
}

/// Line diff of an expected and an actual result.
pub struct Diff<'a> {
    file: &'a str,
    line: usize,
    bytes: &'a [u8],
    expect: &'a str,
    result: &'a str,
}

impl<'a> Diff<'a> {
    pub fn new(
        file: &'a str,
        line: usize,
        bytes: &'a [u8],
        expect: &'a str,
        result: &'a str,
    ) -> Self {
        Self {
            file,
            line,
            bytes,
            expect,
            result,
        }
    }
}

impl fmt::Display for Diff<'_> {
    fn fmt(&self, out: &mut fmt::Formatter) -> fmt::Result {
        use diff::Result as E;

        const W: usize = 5;
        if !self.file.is_empty() {
            writeln!(out, "{:W$}--> {}:{}", ' ', self.file, self.line)?;
        }
        if !self.bytes.is_empty() {
            for (i, chunk) in self.bytes.chunks(8).enumerate() {
                let prefix = if i == 0 { "bytes | " } else { "| " };
                writeln!(out, "{prefix:>10}{}", HexBytes(chunk))?;
            }
        }
        let mut ln = self.line.max(1);
        for diff in diff::lines(self.expect, self.result) {
            match diff {
                E::Left(l) => writeln!(out, "{ln:W$} - {}", Visible(l))?,
                E::Both(l, _) => writeln!(out, "{ln:W$} | {}", Visible(l))?,
                E::Right(r) => {
                    writeln!(out, "{:W$} + {}", ' ', Visible(r))?;
                    continue;
                }
            }
            ln += 1;
        }
        Ok(())
    }
}

/// Compare two multi-line results, printing a diff on mismatch.
pub fn check(file: &str, line: usize, expect: &str, result: &str) -> Result<(), String> {
    if expect != result {
        let err = "invalid result";
        eprintln!("error: {err}");
        eprintln!("{}", Diff::new(file, line, &[], expect, result));
        return Err(err.to_string());
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diff() {
        let text = Diff::new("a.test", 3, &[0x10, 0x01], "ADD r0, r1", "ADD r0, r2").to_string();
        assert!(text.contains("--> a.test:3"));
        assert!(text.contains("bytes | 10 01"));
        assert!(text.contains("    3 - ADD r0, r1"));
        assert!(text.contains("      + ADD r0, r2"));
    }

    #[test]
    fn visible() {
        assert_eq!(Visible("a\tb  ").to_string(), "a→b••");
    }
}
