//! Width-set enumeration for GS1 DataBar characters.
//!
//! A character half is `k` element widths summing to `n` modules, each at
//! most `max_width`. [`rss_value`] ranks such a width set among all valid
//! sets; [`rss_widths`] is its inverse. With `no_narrow` set, sets lacking a
//! single-module element are excluded from the ranking.

fn combins(n: i64, r: i64) -> i64 {
    if r < 0 || n < r {
        return 0;
    }
    let (min_denom, max_denom) = if n - r > r { (r, n - r) } else { (n - r, r) };
    let mut val = 1i64;
    let mut j = 1i64;
    let mut i = n;
    while i > max_denom {
        val *= i;
        if j <= min_denom {
            val /= j;
            j += 1;
        }
        i -= 1;
    }
    while j <= min_denom {
        val /= j;
        j += 1;
    }
    val
}

/// Ranking contribution of choosing `elm_width` for element `bar` when `n`
/// modules remain for the elements from `bar` onward
fn sub_value(n: i64, elements: i64, bar: i64, elm_width: i64, max_width: i64, narrow_mask: u32, no_narrow: bool) -> i64 {
    let mut sub_val = combins(n - elm_width - 1, elements - bar - 2);
    if no_narrow && narrow_mask == 0 && n - elm_width - (elements - bar - 1) >= elements - bar - 1 {
        sub_val -= combins(n - elm_width - (elements - bar), elements - bar - 2);
    }
    if elements - bar - 1 > 1 {
        let mut less_val = 0i64;
        let mut mxw = n - elm_width - (elements - bar - 2);
        while mxw > max_width {
            less_val += combins(n - elm_width - mxw - 1, elements - bar - 3);
            mxw -= 1;
        }
        sub_val -= less_val * (elements - 1 - bar);
    } else if n - elm_width > max_width {
        sub_val -= 1;
    }
    sub_val
}

/// Rank of a width set
pub fn rss_value(widths: &[u32], max_width: u32, no_narrow: bool) -> u32 {
    let elements = widths.len() as i64;
    let mut n: i64 = widths.iter().map(|&w| w as i64).sum();
    let max_width = max_width as i64;
    let mut val = 0i64;
    let mut narrow_mask = 0u32;
    for bar in 0..(elements - 1) {
        let mut elm_width = 1i64;
        narrow_mask |= 1 << bar;
        while elm_width < widths[bar as usize] as i64 {
            val += sub_value(n, elements, bar, elm_width, max_width, narrow_mask, no_narrow);
            elm_width += 1;
            narrow_mask &= !(1 << bar);
        }
        n -= elm_width;
    }
    val.max(0) as u32
}

/// Width set of rank `value` over `elements` widths summing to `modules`
pub fn rss_widths(value: u32, modules: u32, elements: usize, max_width: u32, no_narrow: bool) -> Vec<u32> {
    let mut widths = vec![0u32; elements];
    let elements_i = elements as i64;
    let max_width = max_width as i64;
    let mut n = modules as i64;
    let mut val = value as i64;
    let mut narrow_mask = 0u32;
    for bar in 0..(elements_i - 1) {
        let mut elm_width = 1i64;
        narrow_mask |= 1 << bar;
        loop {
            let sub_val = sub_value(n, elements_i, bar, elm_width, max_width, narrow_mask, no_narrow);
            if val - sub_val < 0 || n - elm_width <= elements_i - bar - 1 {
                break;
            }
            val -= sub_val;
            elm_width += 1;
            narrow_mask &= !(1 << bar);
        }
        n -= elm_width;
        widths[bar as usize] = elm_width as u32;
    }
    widths[elements - 1] = n as u32;
    widths
}
