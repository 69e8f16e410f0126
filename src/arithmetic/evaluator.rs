use super::Field;

/// Coefficients `c_0..c_{n-1}` of the monic polynomial
/// `x^n + c_0 x^{n-1} + ... + c_{n-1}`, leading coefficient implied.
pub type CoefficientVector = Vec<u32>;

/// Evaluates the monic polynomial at `x` with Horner's method.
pub fn eval(field: &Field, coeffs: &[u32], x: u32) -> u32 {
    let x = field.reduce(x as u64);
    let mut result = field.reduce(1);
    for &coeff in coeffs {
        result = field.add(field.mul(result, x), coeff);
    }
    result
}

/// Divides the monic polynomial by `(x - root)` with synthetic division,
/// returning the monic quotient and the remainder.
pub fn divide_by_root(field: &Field, coeffs: &[u32], root: u32) -> (CoefficientVector, u32) {
    let root = field.reduce(root as u64);
    let mut quotient = Vec::with_capacity(coeffs.len());
    let mut carry = field.reduce(1);
    for &coeff in coeffs {
        carry = field.add(coeff, field.mul(carry, root));
        quotient.push(carry);
    }
    let remainder = quotient.pop().unwrap_or(0);
    (quotient, remainder)
}

/// Number of times `root` divides the monic polynomial.
pub fn root_multiplicity(field: &Field, coeffs: &[u32], root: u32) -> usize {
    let mut multiplicity = 0;
    let mut poly = coeffs.to_vec();
    while !poly.is_empty() {
        let (quotient, remainder) = divide_by_root(field, &poly, root);
        if remainder != 0 {
            break;
        }
        multiplicity += 1;
        poly = quotient;
    }
    multiplicity
}

/// Finds the roots of the monic polynomial by evaluating it at every element
/// of the field. Linear in the modulus, so only practical for small fields.
/// Each root is returned once regardless of its multiplicity.
pub fn find_roots_by_trial(field: &Field, coeffs: &[u32]) -> Vec<u32> {
    if coeffs.is_empty() {
        return vec![];
    }
    let mut roots = vec![];
    for x in 0..field.modulus() {
        if eval(field, coeffs, x) == 0 {
            roots.push(x);
            if roots.len() == coeffs.len() {
                break;
            }
        }
    }
    roots
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eval() {
        let f = Field::new(65521);
        // x^2 - 5x + 6 = (x - 2)(x - 3)
        let coeffs = vec![f.neg(5), 6];
        assert_eq!(eval(&f, &coeffs, 2), 0);
        assert_eq!(eval(&f, &coeffs, 3), 0);
        assert_eq!(eval(&f, &coeffs, 4), 2);
        assert_eq!(eval(&f, &[], 4), 1, "empty polynomial is the constant 1");
    }

    #[test]
    fn test_eval_reduces_input() {
        let f = Field::new(65521);
        let coeffs = vec![f.neg(1)];
        assert_eq!(eval(&f, &coeffs, 65522), 0, "65522 is 1 in the field");
    }

    #[test]
    fn test_find_roots_by_trial() {
        let f = Field::new(101);
        // (x - 7)(x - 50)(x - 99)
        let e1 = (7 + 50 + 99) % 101;
        let e2 = (7 * 50 + 7 * 99 + 50 * 99) % 101;
        let e3 = (7 * 50 * 99) % 101;
        let coeffs = vec![f.neg(e1), e2, f.neg(e3)];
        assert_eq!(find_roots_by_trial(&f, &coeffs), vec![7, 50, 99]);
    }

    #[test]
    fn test_root_multiplicity() {
        let f = Field::new(101);
        // (x - 3)^2 (x - 4) = x^3 - 10x^2 + 33x - 36
        let coeffs = vec![f.neg(10), 33, f.neg(36)];
        assert_eq!(root_multiplicity(&f, &coeffs, 3), 2);
        assert_eq!(root_multiplicity(&f, &coeffs, 4), 1);
        assert_eq!(root_multiplicity(&f, &coeffs, 5), 0);
        let (quotient, remainder) = divide_by_root(&f, &coeffs, 4);
        assert_eq!(remainder, 0);
        assert_eq!(quotient, vec![f.neg(6), 9]);
    }

    #[test]
    fn test_find_roots_by_trial_no_roots() {
        let f = Field::new(7);
        // x^2 + 1 has no roots mod 7
        assert!(find_roots_by_trial(&f, &[0, 1]).is_empty());
    }
}
