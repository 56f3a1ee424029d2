//! Floor type 1: piecewise line-segment spectral envelope.
//!
//! Breakpoint positions are fixed at setup; each block transmits only the
//! breakpoint amplitudes, coded through a partition/class/subclass book
//! hierarchy. Every amplitude after the first two is predicted by line
//! interpolation between its nearest already-placed neighbors and the coded
//! value is a fold around that prediction. The unwrap rule below is dense
//! bit-twiddling reproduced exactly, since any deviation silently
//! desynchronizes every later value without raising an error.

use anyhow::{Result, bail};

use crate::structs::codebook::{Codebook, CodebookConfig};
use crate::utils::bitstream_io::{BsIoSliceReader, ilog, starved};
use crate::utils::errors::FloorError;

/// Breakpoint ceiling; two more slots hold the implicit edge posts.
pub const MAX_POSTS: usize = 63;
const MAX_PARTITIONS: usize = 31;
const MAX_CLASSES: usize = 16;

#[derive(Debug, Clone)]
pub struct Floor1Config {
    pub partitions: usize,
    pub partition_class: [usize; MAX_PARTITIONS],

    pub class_dim: [usize; MAX_CLASSES],
    pub class_subs: [u32; MAX_CLASSES],
    pub class_book: [usize; MAX_CLASSES],
    pub class_subbook: [[Option<usize>; 8]; MAX_CLASSES],

    /// Amplitude quantization: 1, 2, 3 or 4.
    pub mult: i32,
    /// Breakpoint positions; `[0]` and `[1]` are the implicit edges 0 and
    /// `1 << rangebits`.
    pub postlist: Vec<u32>,
}

impl Floor1Config {
    pub fn read(reader: &mut BsIoSliceReader, books: &[CodebookConfig]) -> Result<Self> {
        let mut cfg = Self {
            partitions: 0,
            partition_class: [0; MAX_PARTITIONS],
            class_dim: [0; MAX_CLASSES],
            class_subs: [0; MAX_CLASSES],
            class_book: [0; MAX_CLASSES],
            class_subbook: [[None; 8]; MAX_CLASSES],
            mult: 0,
            postlist: Vec::new(),
        };

        cfg.partitions = reader.get_n::<u32>(5)? as usize;
        let mut maxclass = None::<usize>;
        for j in 0..cfg.partitions {
            let class = reader.get_n::<u32>(4)? as usize;
            cfg.partition_class[j] = class;
            maxclass = Some(maxclass.map_or(class, |m: usize| m.max(class)));
        }

        for j in 0..maxclass.map_or(0, |m| m + 1) {
            cfg.class_dim[j] = reader.get_n::<u32>(3)? as usize + 1;
            cfg.class_subs[j] = reader.get_n::<u32>(2)?;
            if cfg.class_subs[j] != 0 {
                let book = reader.get_n::<u8>(8)? as usize;
                if book >= books.len() {
                    bail!(FloorError::BookOutOfRange {
                        book,
                        books: books.len(),
                    });
                }
                cfg.class_book[j] = book;
            }
            for k in 0..1usize << cfg.class_subs[j] {
                let book = reader.get_n::<u32>(8)? as i32 - 1;
                if book >= 0 {
                    let book = book as usize;
                    if book >= books.len() {
                        bail!(FloorError::BookOutOfRange {
                            book,
                            books: books.len(),
                        });
                    }
                    cfg.class_subbook[j][k] = Some(book);
                }
            }
        }

        cfg.mult = reader.get_n::<u32>(2)? as i32 + 1;
        let rangebits = reader.get_n::<u32>(4)?;

        let mut count = 0usize;
        cfg.postlist = vec![0u32; 2];
        for j in 0..cfg.partitions {
            count += cfg.class_dim[cfg.partition_class[j]];
            if count > MAX_POSTS {
                bail!(FloorError::TooManyPosts(count + 2));
            }
            while cfg.postlist.len() < count + 2 {
                cfg.postlist.push(reader.get_n0(rangebits)?);
            }
        }
        cfg.postlist[0] = 0;
        cfg.postlist[1] = 1 << rangebits;

        // repeated positions would later interpolate over a zero-length
        // span; reject them up front
        let mut sorted = cfg.postlist.clone();
        sorted.sort_unstable();
        for pair in sorted.windows(2) {
            if pair[0] == pair[1] {
                bail!(FloorError::DuplicatePostPosition(pair[0]));
            }
        }

        Ok(cfg)
    }
}

#[derive(Debug)]
pub struct Floor1Runtime {
    pub cfg: Floor1Config,
    /// Spectrum length this floor renders (half the block size).
    pub n: usize,
    pub posts: usize,
    /// Post indices in ascending position order.
    pub forward_index: Vec<usize>,
    /// Fixed neighbor topology for posts 2.., found once at setup; decode
    /// must follow it exactly.
    pub lo_neighbor: Vec<usize>,
    pub hi_neighbor: Vec<usize>,
    pub quant_q: i32,
}

impl Floor1Runtime {
    pub fn new(cfg: Floor1Config, blocksize: usize) -> Self {
        let posts = cfg.postlist.len();

        let mut forward_index: Vec<usize> = (0..posts).collect();
        forward_index.sort_by_key(|&j| cfg.postlist[j]);

        let range = cfg.postlist[1];
        let mut lo_neighbor = vec![0usize; posts.saturating_sub(2)];
        let mut hi_neighbor = vec![0usize; posts.saturating_sub(2)];
        for j in 0..posts.saturating_sub(2) {
            let mut lo = 0;
            let mut hi = 1;
            let mut lx = 0;
            let mut hx = range;
            let currentx = cfg.postlist[j + 2];
            for (k, &x) in cfg.postlist[..j + 2].iter().enumerate() {
                if x > lx && x < currentx {
                    lo = k;
                    lx = x;
                }
                if x < hx && x > currentx {
                    hi = k;
                    hx = x;
                }
            }
            lo_neighbor[j] = lo;
            hi_neighbor[j] = hi;
        }

        let quant_q = match cfg.mult {
            1 => 256,
            2 => 128,
            3 => 86,
            _ => 64,
        };

        Self {
            cfg,
            n: blocksize / 2,
            posts,
            forward_index,
            lo_neighbor,
            hi_neighbor,
            quant_q,
        }
    }

    /// Pass 1: decode and unwrap the post amplitudes.
    ///
    /// Returns false (channel silent) when the presence bit is unset or the
    /// packet starves mid-decode.
    pub fn inverse1(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        fit_value: &mut Vec<i32>,
    ) -> Result<bool> {
        match self.decode_posts(reader, books, fit_value) {
            Ok(present) => Ok(present),
            Err(e) if starved(&e) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn decode_posts(
        &self,
        reader: &mut BsIoSliceReader,
        books: &[Codebook],
        fit_value: &mut Vec<i32>,
    ) -> std::io::Result<bool> {
        if !reader.get()? {
            return Ok(false);
        }

        let info = &self.cfg;
        fit_value.clear();
        fit_value.resize(self.posts, 0);

        let ampbits = ilog(self.quant_q as u32 - 1);
        fit_value[0] = reader.get_n::<u32>(ampbits)? as i32;
        fit_value[1] = reader.get_n::<u32>(ampbits)? as i32;

        // partition by partition: the class book fixes the cascade value,
        // then each dimension draws from the selected subclass book
        let mut j = 2;
        for i in 0..info.partitions {
            let class = info.partition_class[i];
            let cdim = info.class_dim[class];
            let csubbits = info.class_subs[class];
            let csub = (1u32 << csubbits) - 1;

            let mut cval = 0u32;
            if csubbits != 0 {
                cval = books[info.class_book[class]].decode(reader)?;
            }

            for k in 0..cdim {
                let book = info.class_subbook[class][(cval & csub) as usize];
                cval >>= csubbits;
                fit_value[j + k] = match book {
                    Some(b) => books[b].decode(reader)? as i32,
                    None => 0,
                };
            }
            j += cdim;
        }

        // unwrap the folded values against their predictions
        for i in 2..self.posts {
            let predicted = render_point(
                info.postlist[self.lo_neighbor[i - 2]] as i32,
                info.postlist[self.hi_neighbor[i - 2]] as i32,
                fit_value[self.lo_neighbor[i - 2]],
                fit_value[self.hi_neighbor[i - 2]],
                info.postlist[i] as i32,
            );
            let hiroom = self.quant_q - predicted;
            let loroom = predicted;
            let room = hiroom.min(loroom) << 1;
            let mut val = fit_value[i];

            if val != 0 {
                if val >= room {
                    // fold toward the side with less headroom
                    val = if hiroom > loroom {
                        val - loroom
                    } else {
                        -1 - (val - hiroom)
                    };
                } else if val & 1 != 0 {
                    val = -((val + 1) >> 1);
                } else {
                    val >>= 1;
                }

                fit_value[i] = val + predicted;
                fit_value[self.lo_neighbor[i - 2]] &= 0x7fff;
                fit_value[self.hi_neighbor[i - 2]] &= 0x7fff;
            } else {
                fit_value[i] = predicted | 0x8000;
            }
        }

        Ok(true)
    }

    /// Pass 2: draw the line segments through the dB table, multiplying
    /// onto `out`. Posts still carrying the predicted-only flag are
    /// skipped; their segment is absorbed by the neighbors.
    pub fn inverse2(&self, present: bool, fit_value: &[i32], out: &mut [f32]) {
        let n = self.n;
        if !present {
            out[..n].fill(0.0);
            return;
        }

        let info = &self.cfg;
        let mut hx = 0usize;
        let mut lx = 0usize;
        let mut ly = fit_value[0] * info.mult;

        for j in 1..self.posts {
            let current = self.forward_index[j];
            let hy = fit_value[current] & 0x7fff;
            if hy == fit_value[current] {
                let hy = hy * info.mult;
                hx = info.postlist[current] as usize;

                render_line(lx, hx, ly, hy, out, n);

                lx = hx;
                ly = hy;
            }
        }

        for j in hx.max(1)..n {
            out[j] *= out[j - 1]; // be certain
        }
    }
}

fn render_point(x0: i32, x1: i32, y0: i32, y1: i32, x: i32) -> i32 {
    let y0 = y0 & 0x7fff; // mask off the predicted-only flag
    let y1 = y1 & 0x7fff;

    let dy = y1 - y0;
    let adx = x1 - x0;
    let ady = dy.abs();
    let err = ady * (x - x0);

    let off = err / adx;
    if dy < 0 { y0 - off } else { y0 + off }
}

fn render_line(x0: usize, x1: usize, y0: i32, y1: i32, d: &mut [f32], n: usize) {
    let dy = y1 - y0;
    let adx = (x1 - x0) as i32;
    let mut ady = dy.abs();
    let base = dy / adx;
    let sy = if dy < 0 { base - 1 } else { base + 1 };
    let mut x = x0;
    let mut y = y0;
    let mut err = 0;

    ady -= (base * adx).abs();

    if x >= n {
        return;
    }
    d[x] *= FLOOR_FROMDB[y.clamp(0, 255) as usize];
    loop {
        x += 1;
        if x >= x1 || x >= n {
            break;
        }
        err += ady;
        if err >= adx {
            err -= adx;
            y += sy;
        } else {
            y += base;
        }
        d[x] *= FLOOR_FROMDB[y.clamp(0, 255) as usize];
    }
}

/// 140 dB of range quantized to 256 steps, dB to linear.
#[rustfmt::skip]
static FLOOR_FROMDB: [f32; 256] = [
    1.0649863e-07, 1.1341951e-07, 1.2079015e-07, 1.2863978e-07,
    1.3699951e-07, 1.4590251e-07, 1.5538408e-07, 1.6548181e-07,
    1.7623575e-07, 1.8768855e-07, 1.9988561e-07, 2.128753e-07,
    2.2670913e-07, 2.4144197e-07, 2.5713223e-07, 2.7384213e-07,
    2.9163793e-07, 3.1059021e-07, 3.3077411e-07, 3.5226968e-07,
    3.7516214e-07, 3.9954229e-07, 4.2550680e-07, 4.5315863e-07,
    4.8260743e-07, 5.1396998e-07, 5.4737065e-07, 5.8294187e-07,
    6.2082472e-07, 6.6116941e-07, 7.0413592e-07, 7.4989464e-07,
    7.9862701e-07, 8.5052630e-07, 9.0579828e-07, 9.6466216e-07,
    1.0273513e-06, 1.0941144e-06, 1.1652161e-06, 1.2409384e-06,
    1.3215816e-06, 1.4074654e-06, 1.4989305e-06, 1.5963394e-06,
    1.7000785e-06, 1.8105592e-06, 1.9282195e-06, 2.0535261e-06,
    2.1869758e-06, 2.3290978e-06, 2.4804557e-06, 2.6416497e-06,
    2.8133190e-06, 2.9961443e-06, 3.1908506e-06, 3.3982101e-06,
    3.6190449e-06, 3.8542308e-06, 4.1047004e-06, 4.3714470e-06,
    4.6555282e-06, 4.9580707e-06, 5.2802740e-06, 5.6234160e-06,
    5.9888572e-06, 6.3780469e-06, 6.7925283e-06, 7.2339451e-06,
    7.7040476e-06, 8.2047000e-06, 8.7378876e-06, 9.3057248e-06,
    9.9104632e-06, 1.0554501e-05, 1.1240392e-05, 1.1970856e-05,
    1.2748789e-05, 1.3577278e-05, 1.4459606e-05, 1.5399272e-05,
    1.6400004e-05, 1.7465768e-05, 1.8600792e-05, 1.9809576e-05,
    2.1096914e-05, 2.2467911e-05, 2.3928002e-05, 2.5482978e-05,
    2.7139006e-05, 2.8902651e-05, 3.0780908e-05, 3.2781225e-05,
    3.4911534e-05, 3.7180282e-05, 3.9596466e-05, 4.2169667e-05,
    4.4910090e-05, 4.7828601e-05, 5.0936773e-05, 5.4246931e-05,
    5.7772202e-05, 6.1526565e-05, 6.5524908e-05, 6.9783085e-05,
    7.4317983e-05, 7.9147585e-05, 8.4291040e-05, 8.9768747e-05,
    9.5602426e-05, 0.00010181521, 0.00010843174, 0.00011547824,
    0.00012298267, 0.00013097477, 0.00013948625, 0.00014855085,
    0.00015820453, 0.00016848555, 0.00017943469, 0.00019109536,
    0.00020351382, 0.00021673929, 0.00023082423, 0.00024582449,
    0.00026179955, 0.00027881276, 0.00029693158, 0.00031622787,
    0.00033677814, 0.00035866388, 0.00038197188, 0.00040679456,
    0.00043323036, 0.00046138411, 0.00049136745, 0.00052329927,
    0.00055730621, 0.00059352311, 0.00063209358, 0.00067317058,
    0.00071691700, 0.00076350630, 0.00081312324, 0.00086596457,
    0.00092223983, 0.00098217216, 0.0010459992, 0.0011139742,
    0.0011863665, 0.0012634633, 0.0013455702, 0.0014330129,
    0.0015261382, 0.0016253153, 0.0017309374, 0.0018434235,
    0.0019632195, 0.0020908006, 0.0022266726, 0.0023713743,
    0.0025254795, 0.0026895994, 0.0028643847, 0.0030505286,
    0.0032487691, 0.0034598925, 0.0036847358, 0.0039241906,
    0.0041792066, 0.0044507950, 0.0047400328, 0.0050480668,
    0.0053761186, 0.0057254891, 0.0060975636, 0.0064938176,
    0.0069158225, 0.0073652516, 0.0078438871, 0.0083536271,
    0.0088964928, 0.009474637, 0.010090352, 0.010746080,
    0.011444421, 0.012188144, 0.012980198, 0.013823725,
    0.014722068, 0.015678791, 0.016697687, 0.017782797,
    0.018938423, 0.020169149, 0.021479854, 0.022875735,
    0.024362330, 0.025945531, 0.027631618, 0.029427276,
    0.031339626, 0.033376252, 0.035545228, 0.037855157,
    0.040315199, 0.042935108, 0.045725273, 0.048696758,
    0.051861348, 0.055231591, 0.058820850, 0.062643361,
    0.066714279, 0.071049749, 0.075666962, 0.080584227,
    0.085821044, 0.091398179, 0.097337747, 0.10366330,
    0.11039993, 0.11757434, 0.12521498, 0.13335215,
    0.14201813, 0.15124727, 0.16107617, 0.17154380,
    0.18269168, 0.19456402, 0.20720788, 0.22067342,
    0.23501402, 0.25028656, 0.26655159, 0.28387361,
    0.30232132, 0.32196786, 0.34289114, 0.36517414,
    0.38890521, 0.41417847, 0.44109412, 0.46975890,
    0.50028648, 0.53279791, 0.56742212, 0.60429640,
    0.64356699, 0.68538959, 0.72993007, 0.77736504,
    0.82788260, 0.88168307, 0.9389798, 1.0,
];
