use nalgebra::DVector;

/// Peeling stops once this many points or fewer remain.
pub const PEEL_FLOOR: usize = 10;

const SOLVER_ITERATIONS: usize = 128;
const EPSILON: f64 = 1e-12;

/// Orders `points` by convex-hull layer, outermost layer first.
///
/// Hull layers are removed one at a time until at most [`PEEL_FLOOR`] points are left; those
/// follow in input order. Inside a layer, vertices farther from the centroid of the points that
/// were still present come first, and ties keep input order. Points of different lengths are
/// compared as if padded with zeros.
pub fn hull_peel_order(points: &[Vec<f64>]) -> Vec<usize> {
    let dim = points.iter().map(Vec::len).max().unwrap_or(0);
    let points: Vec<DVector<f64>> = points
        .iter()
        .map(|p| {
            let padded = p.iter().copied().chain(std::iter::repeat(0.0)).take(dim);
            DVector::from_iterator(dim, padded)
        })
        .collect();

    let mut remaining: Vec<usize> = (0..points.len()).collect();
    let mut order = Vec::with_capacity(points.len());
    while remaining.len() > PEEL_FLOOR {
        let mut layer = hull_vertices(&points, &remaining);
        let centroid = centroid(&points, &remaining);
        layer.sort_by(|&a, &b| {
            let da = (&points[a] - &centroid).norm_squared();
            let db = (&points[b] - &centroid).norm_squared();
            db.total_cmp(&da).then(a.cmp(&b))
        });
        remaining.retain(|i| !layer.contains(i));
        order.extend(layer);
    }
    order.extend(remaining);
    order
}

/// Indices (into `points`) of the hull vertices of the `subset`. Never empty for a non-empty
/// subset. Coincident points contribute one vertex, the first of them.
fn hull_vertices(points: &[DVector<f64>], subset: &[usize]) -> Vec<usize> {
    let unique: Vec<usize> = subset
        .iter()
        .enumerate()
        .filter(|&(k, &i)| subset[..k].iter().all(|&j| points[j] != points[i]))
        .map(|(_, &i)| i)
        .collect();

    let vertices = match points.first().map(DVector::len).unwrap_or(0) {
        0 => Vec::new(),
        1 => extremes_1d(points, &unique),
        2 => monotone_chain(points, &unique),
        _ => unique
            .iter()
            .copied()
            .filter(|&i| {
                let others: Vec<&DVector<f64>> = unique
                    .iter()
                    .filter(|&&j| j != i)
                    .map(|&j| &points[j])
                    .collect();
                is_separated(&points[i], &others)
            })
            .collect(),
    };
    if !vertices.is_empty() {
        return vertices;
    }
    // The point farthest from the centroid is always a vertex.
    let centroid = centroid(points, subset);
    subset
        .iter()
        .copied()
        .max_by(|&a, &b| {
            let da = (&points[a] - &centroid).norm_squared();
            let db = (&points[b] - &centroid).norm_squared();
            da.total_cmp(&db).then(b.cmp(&a))
        })
        .into_iter()
        .collect()
}

fn centroid(points: &[DVector<f64>], subset: &[usize]) -> DVector<f64> {
    let dim = points.first().map(DVector::len).unwrap_or(0);
    let sum = subset
        .iter()
        .fold(DVector::zeros(dim), |acc, &i| acc + &points[i]);
    sum / subset.len().max(1) as f64
}

fn extremes_1d(points: &[DVector<f64>], unique: &[usize]) -> Vec<usize> {
    let by_value = |a: &&usize, b: &&usize| points[**a][0].total_cmp(&points[**b][0]);
    let mut vertices: Vec<usize> = unique
        .iter()
        .min_by(by_value)
        .into_iter()
        .chain(unique.iter().max_by(by_value))
        .copied()
        .collect();
    vertices.dedup();
    vertices
}

/// Andrew's monotone chain. Points lying on a hull edge are not vertices.
fn monotone_chain(points: &[DVector<f64>], unique: &[usize]) -> Vec<usize> {
    if unique.len() < 3 {
        return unique.to_vec();
    }
    let mut sorted = unique.to_vec();
    sorted.sort_by(|&a, &b| {
        points[a][0]
            .total_cmp(&points[b][0])
            .then(points[a][1].total_cmp(&points[b][1]))
    });
    let cross = |o: usize, a: usize, b: usize| {
        (points[a][0] - points[o][0]) * (points[b][1] - points[o][1])
            - (points[a][1] - points[o][1]) * (points[b][0] - points[o][0])
    };

    let mut hull: Vec<usize> = Vec::with_capacity(2 * sorted.len());
    for pass in [sorted.clone(), sorted.iter().rev().copied().collect()] {
        let start = hull.len();
        for i in pass {
            while hull.len() >= start + 2 {
                let (o, a) = (hull[hull.len() - 2], hull[hull.len() - 1]);
                if cross(o, a, i) > 0.0 {
                    break;
                }
                hull.pop();
            }
            hull.push(i);
        }
        // The last point of each chain starts the other one.
        hull.pop();
    }
    hull.sort_unstable();
    hull.dedup();
    hull
}

/// Whether a hyperplane strictly separates `p` from every point of `others`.
///
/// Runs Frank-Wolfe on the distance from `p` to the hull of `others`. A point that stays within
/// solver tolerance of that hull after the iteration budget counts as inside.
fn is_separated(p: &DVector<f64>, others: &[&DVector<f64>]) -> bool {
    let Some(mut x) = others
        .iter()
        .min_by(|a, b| (**a - p).norm_squared().total_cmp(&(**b - p).norm_squared()))
        .map(|q| (*q).clone())
    else {
        return true;
    };
    let scale = others
        .iter()
        .map(|q| (*q - p).norm_squared())
        .fold(0.0, f64::max)
        .max(EPSILON);

    for _ in 0..SOLVER_ITERATIONS {
        let d = &x - p;
        if d.norm_squared() <= EPSILON * scale {
            return false;
        }
        let Some(s) = others
            .iter()
            .min_by(|a, b| d.dot(**a).total_cmp(&d.dot(**b)))
            .copied()
        else {
            return true;
        };
        if d.dot(&(s - p)) > EPSILON * scale {
            return true;
        }
        let step = s - &x;
        let length = step.norm_squared();
        if length <= EPSILON * scale {
            return false;
        }
        let gamma = (-d.dot(&step) / length).clamp(0.0, 1.0);
        x += step * gamma;
    }
    false
}
