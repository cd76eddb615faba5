//! Fair allocation of the global result budget across backends

/// Splits `cap` result slots across backends with `candidates[i]` results each
///
/// The quotas sum to `min(cap, total)`, never exceed a backend's own count,
/// and no backend with candidates is starved while another still has unused
/// ones. Equal shares are handed out while the remaining budget covers every
/// active backend; once it no longer does, single slots go round-robin in
/// backend order.
pub fn fair_split(candidates: &[usize], cap: usize) -> Vec<usize> {
    let total: usize = candidates.iter().sum();
    if total <= cap {
        return candidates.to_vec();
    }

    let mut quotas = vec![0; candidates.len()];
    let mut remaining = candidates.to_vec();
    let mut budget = cap;
    let mut active: Vec<usize> = (0..candidates.len())
        .filter(|&i| remaining[i] > 0)
        .collect();

    while budget > 0 && !active.is_empty() {
        let share = budget / active.len();
        if share == 0 {
            break;
        }

        for &i in &active {
            let grant = share.min(remaining[i]);
            quotas[i] += grant;
            remaining[i] -= grant;
            budget -= grant;
        }
        active.retain(|&i| remaining[i] > 0);
    }

    while budget > 0 && !active.is_empty() {
        for &i in &active {
            if budget == 0 {
                break;
            }
            quotas[i] += 1;
            remaining[i] -= 1;
            budget -= 1;
        }
        active.retain(|&i| remaining[i] > 0);
    }

    quotas
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_well_formed(candidates: &[usize], cap: usize, quotas: &[usize]) {
        let total: usize = candidates.iter().sum();
        assert_eq!(quotas.len(), candidates.len());
        assert_eq!(quotas.iter().sum::<usize>(), total.min(cap));
        for (quota, count) in quotas.iter().zip(candidates) {
            assert!(quota <= count);
        }
    }

    #[test]
    fn test_under_cap_is_unchanged() {
        assert_eq!(fair_split(&[3, 0, 7], 200), vec![3, 0, 7]);
        assert_eq!(fair_split(&[100, 100], 200), vec![100, 100]);
    }

    #[test]
    fn test_uneven_counts() {
        let quotas = fair_split(&[5, 3, 0], 6);
        assert_well_formed(&[5, 3, 0], 6, &quotas);
        assert_eq!(quotas, vec![3, 3, 0]);
    }

    #[test]
    fn test_cap_smaller_than_backend_count() {
        let quotas = fair_split(&[1, 1, 1], 2);
        assert_eq!(quotas, vec![1, 1, 0]);
    }

    #[test]
    fn test_small_backend_leftover_goes_to_large() {
        let quotas = fair_split(&[150, 10, 150], 200);
        assert_well_formed(&[150, 10, 150], 200, &quotas);
        assert_eq!(quotas[1], 10);
        assert_eq!(quotas, vec![95, 10, 95]);
    }

    #[test]
    fn test_remainder_goes_round_robin() {
        let quotas = fair_split(&[10, 10, 10], 8);
        assert_eq!(quotas, vec![3, 3, 2]);
    }

    #[test]
    fn test_zero_cap() {
        assert_eq!(fair_split(&[4, 2], 0), vec![0, 0]);
    }

    #[test]
    fn test_empty_input() {
        assert!(fair_split(&[], 10).is_empty());
    }

    #[test]
    fn test_many_shapes_are_well_formed() {
        let shapes: Vec<Vec<usize>> = vec![
            vec![1, 2, 3, 4, 5],
            vec![500, 0, 1, 0, 2],
            vec![7; 9],
            vec![0, 0, 300],
            vec![199, 1, 1],
        ];

        for candidates in shapes {
            for cap in [0, 1, 2, 5, 17, 200] {
                let quotas = fair_split(&candidates, cap);
                assert_well_formed(&candidates, cap, &quotas);

                // A backend left short means every other backend is either
                // exhausted or received at least as many slots minus one.
                for (i, (&quota, &count)) in quotas.iter().zip(&candidates).enumerate() {
                    if quota < count {
                        for (j, &other) in quotas.iter().enumerate() {
                            if j != i && other < candidates[j] {
                                assert!(other <= quota + 1, "{:?} cap {}", candidates, cap);
                            }
                        }
                    }
                }
            }
        }
    }
}
