//! `printf`-style formatting for scripts.
//!
//! Supported conversions: `%d %i %u %x %X %c %s %f %%`, each with optional
//! `-` (left align) and `0` (zero pad) flags, a field width and, for `%f`,
//! a precision (`%.2f`, default 6).

use super::Value;
use crate::error::Fault;

#[derive(Debug, Default, Clone, Copy)]
struct Spec {
    left: bool,
    zero: bool,
    width: usize,
    precision: Option<usize>,
}

pub fn printf(fmt: &str, args: &[Value]) -> Result<String, Fault> {
    let mut out = String::with_capacity(fmt.len());
    let mut args = args.iter();
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let mut spec = Spec::default();
        while let Some(&flag) = chars.peek() {
            match flag {
                '-' => spec.left = true,
                '0' => spec.zero = true,
                _ => break,
            }
            chars.next();
        }
        while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
            spec.width = spec.width * 10 + d as usize;
            chars.next();
        }
        if chars.peek() == Some(&'.') {
            chars.next();
            let mut p = 0;
            while let Some(d) = chars.peek().and_then(|c| c.to_digit(10)) {
                p = p * 10 + d as usize;
                chars.next();
            }
            spec.precision = Some(p);
        }
        let Some(conv) = chars.next() else {
            out.push('%');
            break;
        };
        if conv == '%' {
            out.push('%');
            continue;
        }
        let arg = args.next().ok_or(Fault::BadArguments("printf"))?;
        let (body, numeric) = match conv {
            'd' | 'i' => (arg.as_int()?.to_string(), true),
            'u' => ((arg.as_int()? as u32).to_string(), true),
            'x' => (format!("{:x}", arg.as_int()? as u32), true),
            'X' => (format!("{:X}", arg.as_int()? as u32), true),
            'c' => {
                let code = u32::try_from(arg.as_int()?).ok().and_then(char::from_u32);
                (code.unwrap_or('?').to_string(), false)
            }
            's' => (arg.to_string(), false),
            'f' => (
                format!("{:.*}", spec.precision.unwrap_or(6), arg.as_float()?),
                true,
            ),
            other => {
                // Unknown conversions are echoed verbatim.
                out.push('%');
                out.push(other);
                continue;
            }
        };
        pad(&mut out, &body, spec, numeric);
    }
    Ok(out)
}

fn pad(out: &mut String, body: &str, spec: Spec, numeric: bool) {
    let len = body.chars().count();
    if len >= spec.width {
        out.push_str(body);
        return;
    }
    let fill = spec.width - len;
    if spec.left {
        out.push_str(body);
        out.extend(core::iter::repeat_n(' ', fill));
    } else if spec.zero && numeric {
        let digits = match body.strip_prefix('-') {
            Some(rest) => {
                out.push('-');
                rest
            }
            None => body,
        };
        out.extend(core::iter::repeat_n('0', fill));
        out.push_str(digits);
    } else {
        out.extend(core::iter::repeat_n(' ', fill));
        out.push_str(body);
    }
}
