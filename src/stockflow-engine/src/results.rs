// Copyright 2025 The Stockflow Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::collections::HashMap;

use crate::common::Ident;

pub(crate) const TIME_OFF: usize = 0;

/// The saved series of a simulation run.
///
/// Each saved point is one row of `step_size` floats: the time value in
/// column [`TIME_OFF`], then one column per stock in schema declaration
/// order.  Warnings collected after integration (divergence and step
/// underflow notices) ride along without affecting the data layout.
#[derive(PartialEq, Clone, Debug)]
pub struct Results {
    pub offsets: HashMap<Ident, usize>,
    pub stock_ids: Vec<Ident>,
    // one large allocation
    pub data: Box<[f64]>,
    pub step_size: usize,
    pub step_count: usize,
    pub warnings: Vec<String>,
}

impl Results {
    pub(crate) fn new(
        stock_ids: Vec<Ident>,
        data: Box<[f64]>,
        step_count: usize,
        warnings: Vec<String>,
    ) -> Results {
        let step_size = stock_ids.len() + 1;
        debug_assert_eq!(step_size * step_count, data.len());
        let offsets: HashMap<Ident, usize> = stock_ids
            .iter()
            .enumerate()
            .map(|(i, id)| (id.clone(), i + 1))
            .collect();
        Results {
            offsets,
            stock_ids,
            data,
            step_size,
            step_count,
            warnings,
        }
    }

    pub fn iter(&self) -> std::iter::Take<std::slice::Chunks<'_, f64>> {
        self.data.chunks(self.step_size).take(self.step_count)
    }

    /// The saved time points, in order.
    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        self.iter().map(|row| row[TIME_OFF])
    }

    /// The series of one stock as `(time, value)` pairs, or None if the
    /// id names no stock in these results.
    pub fn series<'a>(&'a self, id: &str) -> Option<impl Iterator<Item = (f64, f64)> + 'a> {
        let off = *self.offsets.get(id)?;
        Some(self.iter().map(move |row| (row[TIME_OFF], row[off])))
    }

    pub fn print_tsv(&self) {
        print!("time");
        for id in self.stock_ids.iter() {
            print!("\t{id}");
        }
        println!();

        for row in self.iter() {
            for (i, val) in row.iter().enumerate() {
                print!("{val}");
                if i == row.len() - 1 {
                    println!();
                } else {
                    print!("\t");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_point_results() -> Results {
        Results::new(
            vec!["A".to_string(), "B".to_string()],
            vec![0.0, 10.0, 1.0, 0.5, 9.0, 2.0].into_boxed_slice(),
            2,
            vec![],
        )
    }

    #[test]
    fn layout_and_offsets() {
        let results = two_point_results();
        assert_eq!(3, results.step_size);
        assert_eq!(1, results.offsets["A"]);
        assert_eq!(2, results.offsets["B"]);
        assert_eq!(2, results.iter().count());
    }

    #[test]
    fn times_and_series() {
        let results = two_point_results();
        assert_eq!(vec![0.0, 0.5], results.times().collect::<Vec<f64>>());

        let b: Vec<(f64, f64)> = results.series("B").unwrap().collect();
        assert_eq!(vec![(0.0, 1.0), (0.5, 2.0)], b);

        assert!(results.series("missing").is_none());
    }
}
