//! `overlay`: composite a second input over the first.

use rayon::prelude::*;

use crate::error::{NativeError, Result};
use crate::frame::NativeFrame;
use crate::graph::filter::{parse_value, Filter, FilterArgs, LinkFormat};
use crate::sample::CompLayout;

/// Draws input 1 over input 0 with its top-left corner at (`x`, `y`).
/// Offsets may be negative; parts outside the main frame are clipped. Both
/// inputs must share a pixel format.
pub struct OverlayFilter {
    x: i64,
    y: i64,
    main: Option<LinkFormat>,
}

impl OverlayFilter {
    pub const OPTIONS: &'static [&'static str] = &["x", "y"];

    pub fn from_args(args: &FilterArgs) -> Result<Self> {
        Ok(Self {
            x: args.parse_or("x", 0)?,
            y: args.parse_or("y", 0)?,
            main: None,
        })
    }
}

impl Filter for OverlayFilter {
    fn name(&self) -> &'static str {
        "overlay"
    }

    fn nb_inputs(&self) -> usize {
        2
    }

    fn configure(&mut self, inputs: &[LinkFormat]) -> Result<LinkFormat> {
        let (main, over) = match inputs {
            [main, over] => (*main, *over),
            _ => return Err(NativeError::GraphConfig("overlay needs two inputs".into())),
        };
        if main.format.is_hw() || over.format.is_hw() {
            return Err(NativeError::NotSupported("overlay: hardware frames".into()));
        }
        if main.format != over.format {
            return Err(NativeError::NotSupported(format!(
                "overlay: main is {}, overlay is {}",
                main.format, over.format
            )));
        }
        self.main = Some(main);
        Ok(main)
    }

    fn filter_frame(&mut self, inputs: Vec<NativeFrame>) -> Result<NativeFrame> {
        let mut frames = inputs.into_iter();
        let (Some(mut main), Some(over)) = (frames.next(), frames.next()) else {
            return Err(NativeError::InvalidArgument("overlay: expected two frames".into()));
        };
        let link = self
            .main
            .ok_or_else(|| NativeError::GraphConfig("overlay: not configured".into()))?;
        if !link.accepts(&main) || over.format != main.format {
            return Err(NativeError::InvalidArgument(format!(
                "overlay: frames {} and {} do not match the configured {}x{} {}",
                main.format, over.format, link.width, link.height, link.format
            )));
        }
        let comps = CompLayout::all(main.format);
        let alpha = if main.format.has_alpha() {
            comps.get(3).copied()
        } else {
            None
        };
        main.make_writable()?;
        for (index, comp) in comps.iter().enumerate() {
            blend_component(&mut main, &over, comp, alpha.as_ref(), index == 3, (self.x, self.y))?;
        }
        Ok(main)
    }

    fn process_command(&mut self, cmd: &str, arg: &str) -> Result<()> {
        match cmd {
            "x" => self.x = parse_value("overlay", cmd, arg)?,
            "y" => self.y = parse_value("overlay", cmd, arg)?,
            _ => {
                return Err(NativeError::NotSupported(format!(
                    "overlay does not accept command '{cmd}'"
                )))
            }
        }
        Ok(())
    }
}

/// Blend one component of `over` into `main`.
///
/// Colour components use straight alpha: `o * a + m * (1 - a)`. The alpha
/// component itself accumulates as `a_o + a_m * (1 - a_o)`. Without an
/// alpha component the overlay replaces the covered pixels.
fn blend_component(
    main: &mut NativeFrame,
    over: &NativeFrame,
    comp: &CompLayout,
    alpha: Option<&CompLayout>,
    is_alpha: bool,
    (x, y): (i64, i64),
) -> Result<()> {
    let (ow, oh) = comp.dims(over.width, over.height);
    let (mw, mh) = comp.dims(main.width, main.height);
    let ox = x.div_euclid(1 << comp.log2_w);
    let oy = y.div_euclid(1 << comp.log2_h);
    let over_stride = over.stride(comp.plane);
    let over_plane = over
        .plane(comp.plane)
        .ok_or_else(|| NativeError::InvalidArgument(format!("overlay: no plane {}", comp.plane)))?;
    let alpha_src = match alpha {
        Some(a) => Some((
            a,
            over.stride(a.plane),
            over.plane(a.plane).ok_or_else(|| {
                NativeError::InvalidArgument(format!("overlay: no alpha plane {}", a.plane))
            })?,
        )),
        None => None,
    };
    let (aw, ah) = alpha.map_or((0, 0), |a| a.dims(over.width, over.height));
    let main_stride = main.stride(comp.plane);
    let main_plane = main.plane_mut(comp.plane)?;

    main_plane
        .par_chunks_mut(main_stride)
        .take(mh)
        .enumerate()
        .for_each(|(my, row)| {
            let j = my as i64 - oy;
            if j < 0 || j >= oh as i64 {
                return;
            }
            let j = j as usize;
            let src_row = &over_plane[j * over_stride..];
            let first = ox.max(0) as usize;
            let last = (ox + ow as i64).min(mw as i64);
            for mx in first..last.max(0) as usize {
                let i = (mx as i64 - ox) as usize;
                let o = comp.read(src_row, i);
                let value = match alpha_src {
                    None => o,
                    Some((a, stride, plane)) => {
                        let ax = (i << comp.log2_w).min(aw - 1);
                        let ay = (j << comp.log2_h).min(ah - 1);
                        let a_o = a.read(&plane[ay * stride..], ax) / a.max;
                        let m = comp.read(row, mx);
                        if is_alpha {
                            (a_o + m / comp.max * (1.0 - a_o)) * comp.max
                        } else {
                            o * a_o + m * (1.0 - a_o)
                        }
                    }
                };
                comp.write(row, mx, value);
            }
        });
    Ok(())
}
