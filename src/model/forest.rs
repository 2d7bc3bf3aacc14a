use serde::Deserialize;

use super::{check_width, Classifier};
use crate::error::ModelError;
use crate::features::FeatureSchema;

const LEAF: i64 = -1;

#[derive(Debug, Deserialize)]
pub(crate) struct ForestParams {
    classes: Vec<i64>,
    trees: Vec<TreeParams>,
}

/// Flattened tree layout: node `i` is a leaf when `children_left[i] == -1`,
/// otherwise it sends `x[feature[i]] <= threshold[i]` to the left child.
#[derive(Debug, Deserialize)]
pub(crate) struct TreeParams {
    children_left: Vec<i64>,
    children_right: Vec<i64>,
    feature: Vec<i64>,
    threshold: Vec<f64>,
    /// Per-node class weights, one entry per class.
    value: Vec<Vec<f64>>,
}

#[derive(Debug, Clone)]
enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    /// Normalized class distribution.
    Leaf(Vec<f64>),
}

#[derive(Debug, Clone)]
pub struct DecisionTree {
    nodes: Vec<Node>,
}

impl DecisionTree {
    fn from_params(p: TreeParams, n_features: usize, n_classes: usize) -> Result<Self, ModelError> {
        let n = p.children_left.len();
        if n == 0 {
            return Err(ModelError::Invalid("tree has no nodes".into()));
        }
        if [p.children_right.len(), p.feature.len(), p.threshold.len(), p.value.len()]
            .iter()
            .any(|&len| len != n)
        {
            return Err(ModelError::Invalid("tree arrays differ in length".into()));
        }

        let mut nodes = Vec::with_capacity(n);
        for i in 0..n {
            let (l, r) = (p.children_left[i], p.children_right[i]);
            if l == LEAF {
                let weights = &p.value[i];
                if weights.len() != n_classes {
                    return Err(ModelError::Invalid(format!(
                        "leaf {} has {} class weights, expected {}",
                        i,
                        weights.len(),
                        n_classes
                    )));
                }
                let total: f64 = weights.iter().sum();
                if !(total > 0.0) {
                    return Err(ModelError::Invalid(format!("leaf {} has no weight", i)));
                }
                nodes.push(Node::Leaf(weights.iter().map(|w| w / total).collect()));
                continue;
            }

            // Children must come after their parent, which also rules out cycles.
            let child = |c: i64| -> Result<usize, ModelError> {
                if c as usize > i && (c as usize) < n && c > 0 {
                    Ok(c as usize)
                } else {
                    Err(ModelError::Invalid(format!("node {} has bad child index {}", i, c)))
                }
            };
            let feature = p.feature[i];
            if feature < 0 || feature as usize >= n_features {
                return Err(ModelError::Invalid(format!(
                    "node {} splits on feature {} of {}",
                    i, feature, n_features
                )));
            }
            nodes.push(Node::Split {
                feature: feature as usize,
                threshold: p.threshold[i],
                left: child(l)?,
                right: child(r)?,
            });
        }

        Ok(Self { nodes })
    }

    /// Class distribution of the leaf `x` lands in.
    pub fn leaf_distribution(&self, x: &[f64]) -> &[f64] {
        let mut i = 0;
        loop {
            match &self.nodes[i] {
                Node::Leaf(dist) => return dist,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    i = if x[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    pub fn n_nodes(&self) -> usize {
        self.nodes.len()
    }

    pub fn n_leaves(&self) -> usize {
        self.nodes.iter().filter(|n| matches!(n, Node::Leaf(_))).count()
    }
}

/// Soft-voting ensemble: mean of leaf distributions, highest mean wins,
/// lowest class index on ties.
#[derive(Debug)]
pub struct RandomForest {
    schema: FeatureSchema,
    classes: Vec<i64>,
    trees: Vec<DecisionTree>,
}

impl RandomForest {
    pub(crate) fn new(schema: FeatureSchema, p: ForestParams) -> Result<Self, ModelError> {
        if p.classes.is_empty() {
            return Err(ModelError::Invalid("forest lists no classes".into()));
        }
        if p.trees.is_empty() {
            return Err(ModelError::Invalid("forest has no trees".into()));
        }
        let n_features = schema.len();
        let n_classes = p.classes.len();
        let trees = p
            .trees
            .into_iter()
            .map(|t| DecisionTree::from_params(t, n_features, n_classes))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            schema,
            classes: p.classes,
            trees,
        })
    }

    pub fn trees(&self) -> &[DecisionTree] {
        &self.trees
    }

    pub fn predict_proba(&self, x: &[f64]) -> Vec<f64> {
        let mut acc = vec![0.0; self.classes.len()];
        for tree in &self.trees {
            for (a, p) in acc.iter_mut().zip(tree.leaf_distribution(x)) {
                *a += p;
            }
        }
        let n = self.trees.len() as f64;
        acc.iter_mut().for_each(|a| *a /= n);
        acc
    }

    fn predict_one(&self, x: &[f64]) -> i64 {
        let proba = self.predict_proba(x);
        let mut best = 0;
        for (i, p) in proba.iter().enumerate() {
            if *p > proba[best] {
                best = i;
            }
        }
        self.classes[best]
    }
}

impl Classifier for RandomForest {
    fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    fn predict(&self, rows: &[Vec<f64>]) -> Result<Vec<i64>, ModelError> {
        check_width(rows, self.schema.len())?;
        Ok(rows.iter().map(|x| self.predict_one(x)).collect())
    }

    fn kind(&self) -> &'static str {
        "forest"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema() -> FeatureSchema {
        FeatureSchema {
            name: "t".into(),
            version: 1,
            features: vec!["a".into(), "b".into()],
        }
    }

    // a <= 5 -> class 0, else class 1
    fn stump(feature: i64, threshold: f64) -> TreeParams {
        TreeParams {
            children_left: vec![1, -1, -1],
            children_right: vec![2, -1, -1],
            feature: vec![feature, -2, -2],
            threshold: vec![threshold, -2.0, -2.0],
            value: vec![vec![5.0, 5.0], vec![4.0, 1.0], vec![0.0, 3.0]],
        }
    }

    #[test]
    fn stump_routes_on_threshold() {
        let f = RandomForest::new(
            schema(),
            ForestParams {
                classes: vec![0, 1],
                trees: vec![stump(0, 5.0)],
            },
        )
        .unwrap();
        assert_eq!(f.trees()[0].n_nodes(), 3);
        assert_eq!(f.trees()[0].n_leaves(), 2);
        let out = f
            .predict(&[vec![5.0, 0.0], vec![5.1, 0.0], vec![-1.0, 99.0]])
            .unwrap();
        assert_eq!(out, vec![0, 1, 0]);
    }

    #[test]
    fn votes_are_averaged() {
        let f = RandomForest::new(
            schema(),
            ForestParams {
                classes: vec![0, 1],
                trees: vec![stump(0, 5.0), stump(1, 5.0), stump(1, 5.0)],
            },
        )
        .unwrap();
        // tree 1 says 0 (0.8/0.2), trees 2 and 3 say 1 (0/1)
        let p = f.predict_proba(&[0.0, 9.0]);
        assert!((p[0] - 0.8 / 3.0).abs() < 1e-12);
        assert_eq!(f.predict(&[vec![0.0, 9.0]]).unwrap(), vec![1]);
    }

    #[test]
    fn tie_goes_to_first_class() {
        let tree = TreeParams {
            children_left: vec![-1],
            children_right: vec![-1],
            feature: vec![-2],
            threshold: vec![-2.0],
            value: vec![vec![1.0, 1.0]],
        };
        let f = RandomForest::new(
            schema(),
            ForestParams {
                classes: vec![0, 1],
                trees: vec![tree],
            },
        )
        .unwrap();
        assert_eq!(f.predict(&[vec![0.0, 0.0]]).unwrap(), vec![0]);
    }

    #[test]
    fn backward_child_is_rejected() {
        let mut t = stump(0, 5.0);
        t.children_left[0] = 0;
        let err = DecisionTree::from_params(t, 2, 2).unwrap_err();
        assert!(err.to_string().contains("bad child index"));
    }

    #[test]
    fn split_feature_must_exist() {
        let err = DecisionTree::from_params(stump(7, 5.0), 2, 2).unwrap_err();
        assert!(err.to_string().contains("feature 7"));
    }
}
