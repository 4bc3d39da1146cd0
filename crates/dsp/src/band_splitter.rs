//! A two-band crossover built from a first-order all-pass and a matched two-pole low-pass.
//!
//! The bands are all-pass complementary: `high + low` reconstructs the input run through the
//! splitter's all-pass section, so the pair can be recombined after per-band processing without
//! magnitude ripple.  [BandSplitter::apply_allpass] exposes that all-pass section on its own,
//! which callers use to pre-compensate the splitter's phase shift (run the all-pass over a
//! time-reversed signal, reverse again, then split; the two phase shifts cancel).

/// Two-band splitter with double-precision state.
///
/// All buffers are processed sample-by-sample; state persists across calls to
/// [BandSplitter::process] until [BandSplitter::clear] is called.
#[derive(Debug, Clone)]
pub struct BandSplitter {
    coeff: f64,
    lp_z1: f64,
    lp_z2: f64,
    ap_z1: f64,
}

impl BandSplitter {
    /// Create a splitter with the crossover at `f0norm`, the transition frequency divided by the
    /// sample rate.  `f0norm` must be in `(0, 0.5)`.
    pub fn new(f0norm: f64) -> BandSplitter {
        let w = f0norm * std::f64::consts::TAU;
        let cw = w.cos();
        let coeff = if cw > f32::EPSILON as f64 {
            (w.sin() - 1.0) / cw
        } else {
            cw * -0.5
        };

        BandSplitter {
            coeff,
            lp_z1: 0.0,
            lp_z2: 0.0,
            ap_z1: 0.0,
        }
    }

    /// Reset the filter state.  The crossover frequency is kept.
    pub fn clear(&mut self) {
        self.lp_z1 = 0.0;
        self.lp_z2 = 0.0;
        self.ap_z1 = 0.0;
    }

    /// Split `input` into its high band (`hp_out`) and low band (`lp_out`).
    ///
    /// The low band is the input through two matched one-pole low-pass stages; the high band is
    /// the all-passed input minus the low band, so `hp + lp` equals the all-passed input exactly.
    ///
    /// # Panics
    ///
    /// Panics if the three slices differ in length.
    pub fn process(&mut self, hp_out: &mut [f64], lp_out: &mut [f64], input: &[f64]) {
        assert_eq!(hp_out.len(), input.len());
        assert_eq!(lp_out.len(), input.len());

        let ap_coeff = self.coeff;
        let lp_coeff = self.coeff * 0.5 + 0.5;
        let mut lp_z1 = self.lp_z1;
        let mut lp_z2 = self.lp_z2;
        let mut ap_z1 = self.ap_z1;

        for ((hp, lp), &x) in hp_out.iter_mut().zip(lp_out.iter_mut()).zip(input) {
            // First low-pass stage.
            let mut d = (x - lp_z1) * lp_coeff;
            let mut lp_y = lp_z1 + d;
            lp_z1 = lp_y + d;

            // Second low-pass stage.
            d = (lp_y - lp_z2) * lp_coeff;
            lp_y = lp_z2 + d;
            lp_z2 = lp_y + d;

            *lp = lp_y;

            // All-pass, with the high band as the remainder.
            let ap_y = x * ap_coeff + ap_z1;
            ap_z1 = x - ap_y * ap_coeff;

            *hp = ap_y - lp_y;
        }

        self.lp_z1 = lp_z1;
        self.lp_z2 = lp_z2;
        self.ap_z1 = ap_z1;
    }

    /// Run only the splitter's all-pass section over `samples`, in place.
    ///
    /// Uses its own transient state; the state carried by [BandSplitter::process] is untouched.
    pub fn apply_allpass(&self, samples: &mut [f64]) {
        let coeff = self.coeff;
        let mut z1 = 0.0;
        for s in samples.iter_mut() {
            let out = *s * coeff + z1;
            z1 = *s - out * coeff;
            *s = out;
        }
    }
}
