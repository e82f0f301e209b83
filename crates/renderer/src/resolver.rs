//! Placeholder resolution for missing tiles.
//!
//! A missing tile is stood in for by its resident children (higher resolution, bounded by a
//! depth budget) and then by its resident parent (lower resolution). The resolver walks these
//! candidates with an explicit work stack; the visiting order is the draw order, and earlier
//! draws win the depth test.

use std::collections::HashSet;

use model::TileCoordinate;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResolvedKind {
    /// The requested tile itself.
    Exact,
    /// A descendant drawn in place of a missing tile.
    HigherResolution,
    /// An ancestor drawn in place of a missing tile.
    LowerResolution,
}

/// One tile chosen for drawing, in draw order.
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTile<T> {
    pub coordinate: TileCoordinate,
    /// Source pixels per texel of `coordinate`.
    pub mip: u32,
    pub kind: ResolvedKind,
    pub payload: T,
}

#[derive(Debug)]
struct ResolvePass {
    tiles: Vec<TileCoordinate>,
    mip: u32,
    peek: bool,
    high_res_budget: u32,
    allow_low_res: bool,
    kind: ResolvedKind,
}

/// Resolves `tiles` (all on the layer drawn at `mip`) to drawable tiles.
///
/// `lookup(tile, peek)` returns the drawable payload for a tile, or `None` when it is not
/// available. Requested tiles are looked up with `peek = false` so the caller may start
/// fetching them; placeholders are only peeked. No drawn tile lies more than
/// `high_res_budget` layers below the requested layer.
pub fn resolve_placeholders<T, F>(
    tiles: &[TileCoordinate],
    mip: u32,
    high_res_budget: u32,
    mut lookup: F,
) -> Vec<ResolvedTile<T>>
where
    F: FnMut(TileCoordinate, bool) -> Option<T>,
{
    let mut resolved = Vec::new();
    let mut stack = vec![ResolvePass {
        tiles: tiles.to_vec(),
        mip,
        peek: false,
        high_res_budget,
        allow_low_res: true,
        kind: ResolvedKind::Exact,
    }];

    while let Some(pass) = stack.pop() {
        let mut higher = Vec::new();
        let mut lower = Vec::new();
        let mut lower_seen = HashSet::new();

        for &tile in &pass.tiles {
            if let Some(payload) = lookup(tile, pass.peek) {
                resolved.push(ResolvedTile {
                    coordinate: tile,
                    mip: pass.mip,
                    kind: pass.kind,
                    payload,
                });
                continue;
            }
            if pass.high_res_budget > 0 && pass.mip >= 2 {
                if let Some(children) = tile.children() {
                    higher.extend(children);
                }
            }
            if pass.allow_low_res {
                if let Some(parent) = tile.parent() {
                    if lower_seen.insert(parent) {
                        lower.push(parent);
                    }
                }
            }
        }

        // Pushed in reverse so the higher-resolution pass, and everything it spawns, is
        // visited before the lower-resolution one.
        if !lower.is_empty() {
            stack.push(ResolvePass {
                tiles: lower,
                mip: pass.mip.saturating_mul(2),
                peek: true,
                high_res_budget: 0,
                allow_low_res: true,
                kind: ResolvedKind::LowerResolution,
            });
        }
        if !higher.is_empty() {
            stack.push(ResolvePass {
                tiles: higher,
                mip: pass.mip / 2,
                peek: true,
                high_res_budget: pass.high_res_budget - 1,
                allow_low_res: false,
                kind: ResolvedKind::HigherResolution,
            });
        }
    }

    resolved
}
